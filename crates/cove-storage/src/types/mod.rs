//! Entity records and parameter structs shared by all storage backends.

mod ids;
mod memberships;
mod projects;
mod teams;
mod users;
mod variables;

pub use ids::{ProjectId, TeamId, UserId, VariableId};
pub use memberships::{CreateMembershipParams, Membership, MembershipUpdate};
pub use projects::{CreateProjectParams, Project};
pub use teams::{CreateTeamParams, Team, TeamRole, TeamUpdate};
pub use users::{CreateUserParams, User};
pub use variables::{CreateVariableParams, VariableRecord, VariableUpdate};
