pub mod face_repository;
pub mod records;
