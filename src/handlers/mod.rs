pub mod form;
pub mod health;
pub mod recommendations;

pub use form::{index_page, page_templates, submit_description};
pub use health::health_check;
pub use recommendations::recommendations_config;
