pub mod annotation_repository;

pub use annotation_repository::AnnotationRepository;
