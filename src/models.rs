pub mod board;
pub mod detail;
pub mod invitation;
pub mod member;
pub mod project;
pub mod task;

pub use board::Board;
pub use detail::ProjectDetail;
pub use invitation::{Invitation, InvitationStatus};
pub use member::{Member, Role};
pub use project::{NewProject, PinState, Project, ProjectFields, ProjectOrder};
pub use task::{NewTask, Task, TaskFields};
