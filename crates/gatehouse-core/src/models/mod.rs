pub mod authz;
pub mod binding;
pub mod invitation;
pub mod membership;
pub mod organization;
pub mod pagination;
pub mod permission;
pub mod role;
pub mod status;
pub mod team;

pub use authz::*;
pub use binding::*;
pub use invitation::*;
pub use membership::*;
pub use organization::*;
pub use pagination::*;
pub use permission::*;
pub use role::*;
pub use status::*;
pub use team::*;
