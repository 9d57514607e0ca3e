pub mod control;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod process;
pub mod progress;
pub mod registry;
pub mod scanner;
pub mod selector;
pub mod sinks;
pub mod transfer_engine;

pub use control::{ControlLease, GateOutcome, JobControl, JobControls};
pub use error::BackupError;
pub use models::{BackupJob, BackupMode, BackupProgress, BackupState, LogRecord};
pub use orchestrator::{BackupEngine, JobSummary};
pub use process::{ProcessProbe, ProcfsProbe, StaticProbe};
pub use progress::ProgressTracker;
pub use registry::{JobRegistry, JobResult};
pub use scanner::{SourceFile, scan_directory};
pub use selector::{Selection, prioritize, select_differential};
pub use sinks::{LogSink, LogSinks, MemoryLogSink, NullSink, ProgressChannel, StateSink, StateSinks};
pub use transfer_engine::{CryptoTool, EncryptError, Encryptor, TransferOutcome, TransferUnit};
