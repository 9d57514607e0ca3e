use std::sync::Arc;

use crate::config::{AppConfig, LogFormat};
use crate::core::{
    BackupEngine, CryptoTool, JobRegistry, LogSink, LogSinks, ProcfsProbe, ProgressTracker,
    StateSinks,
};
use crate::store::{JsonLogWriter, JsonStateWriter, XmlLogWriter};

/// Wires the engine to its collaborators from configuration.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub progress: ProgressTracker,
    pub registry: Arc<JobRegistry>,
}

impl AppContext {
    pub fn new(config: AppConfig) -> Self {
        let progress = ProgressTracker::new();

        let log = LogSinks::new().with(log_writer(&config));
        let state = StateSinks::new()
            .with(Arc::new(progress.clone()))
            .with(Arc::new(JsonStateWriter::new(&config.state_directory)));
        let encryptor = CryptoTool::new(config.encryption_tool.clone())
            .with_args(config.encryption_args.clone());

        let engine = BackupEngine::new(
            Arc::new(log),
            Arc::new(state),
            Arc::new(encryptor),
            Arc::new(ProcfsProbe),
        )
        .with_business_software(config.business_software.clone())
        .with_max_file_size(config.max_file_size_limit());

        Self {
            config: Arc::new(config),
            progress,
            registry: Arc::new(JobRegistry::new(Arc::new(engine))),
        }
    }

    pub fn engine(&self) -> &Arc<BackupEngine> {
        self.registry.engine()
    }
}

fn log_writer(config: &AppConfig) -> Arc<dyn LogSink> {
    match config.log_format {
        LogFormat::Json => Arc::new(JsonLogWriter::new(&config.log_directory)),
        LogFormat::Xml => Arc::new(XmlLogWriter::new(&config.log_directory)),
    }
}
