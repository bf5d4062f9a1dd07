pub mod export_best_faces_use_case;
pub mod frame_processor;
pub mod run_logger;
pub mod track_faces_use_case;
pub mod tracking_error;
