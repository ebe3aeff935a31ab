use chrono::NaiveDate;

use crate::db::schema::Angler;
use crate::error::EngineError;

/// A null dues date is treated as expired.
pub fn dues_current(angler: &Angler, today: NaiveDate) -> bool {
    matches!(angler.dues_paid_through, Some(d) if d >= today)
}

/// Whether `actor` may cast a vote as `voter`. Pure; no store access.
///
/// Self-votes require current dues unless the voter is an admin. Proxy
/// votes require the actor to be an admin and do not check the target's
/// dues: the admin is explicitly vouching for the vote.
pub fn check_eligible(actor: &Angler, voter: &Angler, today: NaiveDate) -> Result<(), EngineError> {
    if !voter.member {
        return Err(EngineError::NotAMember(voter.id));
    }

    if actor.id == voter.id {
        if actor.is_admin || dues_current(voter, today) {
            Ok(())
        } else {
            Err(EngineError::DuesLapsed {
                voter_id: voter.id,
                paid_through: voter.dues_paid_through,
            })
        }
    } else if actor.is_admin {
        Ok(())
    } else {
        Err(EngineError::ProxyNotAdmin(actor.id))
    }
}
