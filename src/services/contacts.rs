// Contact service: create and edit tracked relationships.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::{commit_gamification, load_user, GamificationOutcome};
use crate::db::{DbContact, RapportDb};
use crate::error::AppError;
use crate::gamification::award_xp;
use crate::locks::UserLocks;
use crate::reminders::next_due_date;
use crate::types::{ActionType, Cadence};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewContact {
    pub name: String,
    pub cadence: String,
    #[serde(default)]
    pub custom_days: Option<i64>,
    #[serde(default)]
    pub tracked: Option<bool>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Partial update; absent fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactUpdate {
    pub name: Option<String>,
    pub cadence: Option<String>,
    pub custom_days: Option<i64>,
    pub tracked: Option<bool>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactCreated {
    pub contact: DbContact,
    pub gamification: GamificationOutcome,
}

fn validate_name(name: &str) -> Result<String, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::validation("contact name must not be empty"));
    }
    Ok(name.to_string())
}

/// A cadence is stored only if it is one of the known values, and a custom
/// cadence only with a positive day count.
fn validate_cadence(cadence: &str, custom_days: Option<i64>) -> Result<(Cadence, Option<i64>), AppError> {
    let cadence: Cadence = cadence.parse().map_err(AppError::Validation)?;
    match cadence {
        Cadence::Custom => match custom_days {
            Some(days) if days > 0 => Ok((cadence, Some(days))),
            _ => Err(AppError::validation(
                "custom cadence requires a positive number of days",
            )),
        },
        _ => Ok((cadence, None)),
    }
}

/// Create a contact and award `CONTACT_ADDED` XP in one transaction.
pub fn create_contact(
    db: &RapportDb,
    locks: &UserLocks,
    user_id: i64,
    input: &NewContact,
    now: DateTime<Utc>,
) -> Result<ContactCreated, AppError> {
    let name = validate_name(&input.name)?;
    let (cadence, custom_days) = validate_cadence(&input.cadence, input.custom_days)?;

    let mut contact = DbContact {
        id: format!("contact-{}", Uuid::new_v4()),
        user_id,
        name,
        cadence: cadence.as_str().to_string(),
        custom_days,
        tracked: input.tracked.unwrap_or(true),
        last_contact_date: None,
        next_reminder_date: None,
        notes: input.notes.clone().filter(|n| !n.trim().is_empty()),
        created_at: now,
        updated_at: now,
    };
    contact.next_reminder_date = Some(next_due_date(&contact));

    locks.with_user_lock(user_id, || {
        db.with_transaction(|db| {
            let mut user = load_user(db, user_id)?;
            let level_before = user.level;
            db.insert_contact(&contact)?;
            let award = award_xp(
                &mut user,
                ActionType::ContactAdded,
                now,
                Some(json!({ "contactId": contact.id })),
            );
            let gamification = commit_gamification(db, &mut user, level_before, None, &[award], now)?;
            log::info!(
                "Contacts: user {} added '{}' ({})",
                user_id,
                contact.name,
                contact.cadence
            );
            Ok(ContactCreated {
                contact: contact.clone(),
                gamification,
            })
        })
    })
}

/// Edit a contact. Changing the cadence recomputes the cached due date.
pub fn update_contact(
    db: &RapportDb,
    user_id: i64,
    contact_id: &str,
    update: &ContactUpdate,
    now: DateTime<Utc>,
) -> Result<DbContact, AppError> {
    let mut contact = db
        .get_contact(contact_id)?
        .filter(|c| c.user_id == user_id)
        .ok_or_else(|| AppError::not_found("contact", contact_id))?;

    if let Some(name) = &update.name {
        contact.name = validate_name(name)?;
    }

    if update.cadence.is_some() || update.custom_days.is_some() {
        let raw = update.cadence.as_deref().unwrap_or(&contact.cadence);
        let days = update.custom_days.or(contact.custom_days);
        let (cadence, custom_days) = validate_cadence(raw, days)?;
        contact.cadence = cadence.as_str().to_string();
        contact.custom_days = custom_days;
        contact.next_reminder_date = Some(next_due_date(&contact));
    }

    if let Some(tracked) = update.tracked {
        contact.tracked = tracked;
    }
    if let Some(notes) = &update.notes {
        contact.notes = Some(notes.clone()).filter(|n| !n.trim().is_empty());
    }
    contact.updated_at = now;

    if !db.update_contact(&contact)? {
        return Err(AppError::not_found("contact", contact_id));
    }
    Ok(contact)
}
