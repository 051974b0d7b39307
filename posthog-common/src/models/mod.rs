mod action;
mod cohort;
mod dashboard;
mod definitions;
mod event;
mod organization;
mod person;
mod team;

pub use action::{Action, ActionStep, NewAction, UrlMatching};
pub use cohort::Cohort;
pub use dashboard::{Dashboard, DashboardItem, Funnel, NewDashboard, NewDashboardItem};
pub use definitions::{EventDefinition, PropertyDefinition};
pub use event::{Element, Event, NewEvent};
pub use organization::{
    licensed_users_available, License, MembershipLevel, NewUser, Organization, OrganizationInvite,
    User,
};
pub use person::{NewPerson, Person, PersonDistinctId, PersonId};
pub use team::{generate_api_token, NewTeam, Team, TeamId};

/// Name fragment shared by every insight the demo seeding creates.
pub const DEMO_NAME_MARKER: &str = "HogFlix";

/// Person property flagging synthetic demo users.
pub const DEMO_PERSON_PROPERTY: &str = "is_demo";
