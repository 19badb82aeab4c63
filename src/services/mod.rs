pub mod result_retriever;
pub mod warn_writer;

pub use result_retriever::{ResultRetriever, BASIC_PROGRESS_MESSAGE, NO_RESULTS_MESSAGE};
pub use warn_writer::WarnWriter;
