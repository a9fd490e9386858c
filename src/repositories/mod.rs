pub mod repository_repository;

pub use repository_repository::*;