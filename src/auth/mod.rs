pub mod clock;
pub mod navigator;
pub mod providers;
pub mod service;
pub mod storage;
pub mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use navigator::{MemoryNavigator, Navigator};
pub use providers::{IdentityProvider, SecondaryAuthProvider, TokenExchange};
pub use service::{SessionManager, SessionManagerBuilder};
pub use storage::{FileStorage, MemoryStorage, SessionStorage};
pub use token::{CallbackOutcome, CallbackTokens, LoginStatus, Session, UserProfile};
