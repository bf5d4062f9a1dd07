pub mod sqlite_face_repository;
