pub mod chat_task;
pub mod protocol;
pub mod recognition_task;
pub mod rest;
pub mod state;
pub mod ws_handler;

// Re-export the handlers so the binary can build the router from one place.
pub use rest::{
    availability_handler, due_reviews_handler, errors_handler, stats_handler,
    submit_outcome_handler, weak_topics_handler,
};
pub use ws_handler::ws_handler;
