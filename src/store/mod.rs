//! On-disk sinks for the business log and job state files.

pub mod log_writer;
pub mod state_writer;
pub mod xml_log_writer;

pub use log_writer::JsonLogWriter;
pub use state_writer::JsonStateWriter;
pub use xml_log_writer::XmlLogWriter;
