//! Command policy: decides whether a request may run, must be approved, or
//! is refused outright.
//!
//! # Modules
//!
//! - [`verdict`]: `PolicyVerdict` (Allow / Deny / RequireApproval)
//! - [`matcher`]: compiled executable + regex lists
//! - [`roots`]: working-directory containment
//! - [`engine`]: `Policy::validate()` (deny, cwd, allow, default to approval)

pub mod engine;
pub mod matcher;
pub mod roots;
pub mod verdict;

pub use engine::Policy;
pub use matcher::{CommandMatcher, NameMatch};
pub use roots::AllowedRoots;
pub use verdict::PolicyVerdict;
