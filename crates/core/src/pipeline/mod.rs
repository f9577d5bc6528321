pub mod acquisition_loop;
pub mod pipeline_logger;
