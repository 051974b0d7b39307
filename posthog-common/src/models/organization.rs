use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::TeamId;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, sqlx::FromRow)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub uuid: Uuid,
    pub email: String,
    pub first_name: String,
    pub personal_api_key: Option<String>,
    pub current_organization_id: Option<Uuid>,
    pub current_team_id: Option<TeamId>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub email: String,
    pub first_name: String,
    pub personal_api_key: Option<String>,
    pub current_organization_id: Option<Uuid>,
    pub current_team_id: Option<TeamId>,
}

/// Access level inside an organization, values match the ones stored by the web app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
pub enum MembershipLevel {
    Member = 1,
    Admin = 8,
    Owner = 15,
}

impl MembershipLevel {
    pub fn as_i16(self) -> i16 {
        self as i16
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, sqlx::FromRow)]
pub struct OrganizationInvite {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub target_email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, sqlx::FromRow)]
pub struct License {
    pub key: String,
    pub plan: String,
    pub valid_until: DateTime<Utc>,
    pub max_users: Option<i64>,
}

impl License {
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.valid_until > now
    }
}

/// Seats left on the instance license.
///
/// `None` means unmetered: there is no valid license, or the license has no seat cap.
/// Pending invites count as taken seats.
pub fn licensed_users_available(
    license: Option<&License>,
    now: DateTime<Utc>,
    active_users: i64,
    pending_invites: i64,
) -> Option<i64> {
    let license = license.filter(|l| l.is_valid(now))?;
    let max_users = license.max_users?;
    Some((max_users - active_users - pending_invites).max(0))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn license(max_users: Option<i64>, valid_for: Duration) -> License {
        License {
            key: "key_123".to_string(),
            plan: "base_clickhouse".to_string(),
            valid_until: Utc::now() + valid_for,
            max_users,
        }
    }

    #[test]
    fn test_no_license_is_unmetered() {
        assert_eq!(licensed_users_available(None, Utc::now(), 4, 2), None);
    }

    #[test]
    fn test_invites_count_towards_seats() {
        let license = license(Some(3), Duration::days(365));
        assert_eq!(
            licensed_users_available(Some(&license), Utc::now(), 1, 1),
            Some(1)
        );
    }

    #[test]
    fn test_seats_are_clamped_at_zero() {
        let license = license(Some(3), Duration::days(365));
        assert_eq!(
            licensed_users_available(Some(&license), Utc::now(), 5, 2),
            Some(0)
        );
    }

    #[test]
    fn test_expired_license_is_ignored() {
        let license = license(Some(3), -Duration::days(1));
        assert_eq!(
            licensed_users_available(Some(&license), Utc::now(), 1, 0),
            None
        );
    }

    #[test]
    fn test_license_without_cap_is_unmetered() {
        let license = license(None, Duration::days(30));
        assert_eq!(
            licensed_users_available(Some(&license), Utc::now(), 10, 10),
            None
        );
    }
}
