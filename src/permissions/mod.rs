//! Department permission resolution.
//!
//! A decision for `(user, department, resource, action)` is built from four
//! grant sources: direct user grants, role grants, the department's own
//! grants and grants inherited from its ancestors. Lower priority numbers
//! win; contradictions are detected and auto-resolved before every key is
//! reduced to a single decision. Anything undecided is denied.

pub mod aggregator;
pub mod conflict;
pub mod consolidate;
pub mod hierarchy;
pub mod inheritance;
pub mod service;
pub mod templates;

pub use aggregator::PermissionAggregator;
pub use conflict::{ConflictDetector, ConflictResolver};
pub use consolidate::{consolidate, find_decisive};
pub use hierarchy::{DepartmentTree, HierarchyResolver};
pub use inheritance::InheritanceFilter;
pub use service::PermissionService;
pub use templates::{find_predefined, predefined_templates, PermissionTemplateService};
