//! Publishing source-root changes to the remote repository.
pub mod gateway;
pub mod notify;
pub mod pipeline;

pub use gateway::{ChangeKind, ChangeRecord, GitGateway, PushAttempt, RepositoryGateway};
pub use notify::{Notifier, ShellNotifier};
pub use pipeline::{PushOutcome, SyncPipeline, is_network_error};
