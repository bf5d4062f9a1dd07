pub mod bounding_box;
pub mod clock;
pub mod constants;
pub mod face_id;
pub mod face_image;
pub mod frame;
pub mod video_metadata;
