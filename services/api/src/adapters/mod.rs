pub mod classify_llm;
pub mod db;
pub mod ocr_llm;
pub mod tutor_llm;

pub use classify_llm::OpenAiClassifierAdapter;
pub use db::DbAdapter;
pub use ocr_llm::OpenAiVisionAdapter;
pub use tutor_llm::OpenAiTutorAdapter;
