// Root module exports
pub mod classify;
pub mod config;
pub mod error;
pub mod events;
pub mod logger;
pub mod logging;
pub mod manager;
pub mod pipeline;
pub mod platform;
pub mod recovery;
pub mod reporter;

// Re-export common items for convenience
pub use classify::{classify_category, classify_severity, ErrorCategory, ErrorSeverity};
pub use config::{LoggerConfig, PipelineConfig, ReporterConfig};
pub use error::{FaultlineError, RecoveryError, StoreError, TransportError};
pub use events::{ErrorEvent, EventFilter, EventKind};
pub use logger::{ErrorLogEntry, ErrorLogger, ExportFormat, LogFilter};
pub use manager::{
    install_panic_hook, ErrorContext, ErrorId, ErrorManager, ErrorStats, Fault, ManagedError,
    PendingRetry, RecoveryStrategy,
};
pub use pipeline::ErrorPipeline;
pub use platform::{
    Environment, FileReportStore, MemoryReportStore, PlatformInfo, ReportStore, ReportTransport,
};
pub use recovery::{
    recover_with_retry, ErrorRecovery, FallbackAction, NotifyAction, RecoveryAction,
    RecoveryOutcome, RetryAction,
};
pub use reporter::{ErrorReport, ErrorReporter, ReportBatch};
