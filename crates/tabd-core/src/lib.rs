pub mod browser;
pub mod config;
pub mod error;
pub mod gateway;
pub mod router;
pub mod session;

pub use browser::{BrowserEvent, BrowserSupervisor, LaunchRequest, ProcessInfo};
pub use config::DaemonConfig;
pub use error::{DaemonError, ErrorCode, Result};
pub use gateway::{Gateway, GatewayConfig, GatewayEvent};
pub use router::Router;
pub use session::{Session, SessionRegistry, SessionState};
