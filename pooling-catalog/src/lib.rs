pub mod group;
pub mod filters;
pub mod repository;
pub mod cache;
pub mod pagination;
pub mod catalog;
pub mod precheck;
pub mod admin;

pub use group::{BudgetLevel, Capacity, Group, GroupChange, GroupMember, GroupStatus, GroupSummary, TripAttributes, Visibility};
pub use filters::GroupFilters;
pub use repository::{require_group, GroupRepository, InMemoryGroupRepository};
pub use catalog::{CatalogSettings, GroupCatalog};
pub use pagination::{paginate, Page};
pub use precheck::{CompatibleGroup, TripPreferences};
pub use admin::{GroupAction, GroupAdmin, NewGroup, SavedTripOutcome};
