use std::path::{Path, PathBuf};

use crate::persistence::domain::face_repository::FaceRepository;
use crate::shared::face_id::FaceId;
use crate::video::domain::image_writer::ImageWriter;

/// Writes the best crop of every stored identity as `<face_id>.png`.
///
/// Identities whose best crop is empty (the box lay outside the frame) are
/// skipped.
pub struct ExportBestFacesUseCase {
    image_writer: Box<dyn ImageWriter>,
    size: Option<(u32, u32)>,
}

impl ExportBestFacesUseCase {
    pub fn new(image_writer: Box<dyn ImageWriter>, size: Option<(u32, u32)>) -> Self {
        Self { image_writer, size }
    }

    /// Returns the written files, oldest identity first.
    pub fn execute(
        &self,
        repository: &dyn FaceRepository,
        output_dir: &Path,
    ) -> Result<Vec<(FaceId, PathBuf)>, Box<dyn std::error::Error>> {
        let mut written = Vec::new();
        for face in repository.faces()? {
            if face.best_image.is_empty() {
                log::warn!("Face {} has no visible crop, not exported", face.face_id);
                continue;
            }
            let path = output_dir.join(format!("{}.png", face.face_id));
            self.image_writer.write(&path, &face.best_image, self.size)?;
            written.push((face.face_id, path));
        }
        log::info!("Exported {} face(s) to {}", written.len(), output_dir.display());
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::domain::records::Observation;
    use crate::persistence::infrastructure::sqlite_face_repository::SqliteFaceRepository;
    use crate::shared::bounding_box::BoundingBox;
    use crate::shared::face_image::FaceImage;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::{Arc, Mutex};

    #[allow(clippy::type_complexity)]
    struct StubImageWriter {
        written: Arc<Mutex<Vec<(PathBuf, FaceImage, Option<(u32, u32)>)>>>,
    }

    impl ImageWriter for StubImageWriter {
        fn write(
            &self,
            path: &Path,
            image: &FaceImage,
            size: Option<(u32, u32)>,
        ) -> Result<(), Box<dyn std::error::Error>> {
            self.written
                .lock()
                .unwrap()
                .push((path.to_path_buf(), image.clone(), size));
            Ok(())
        }
    }

    fn seeded_repo(images: &[FaceImage]) -> (SqliteFaceRepository, Vec<FaceId>) {
        let mut repo = SqliteFaceRepository::in_memory().unwrap();
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut ids = Vec::new();
        for (i, image) in images.iter().enumerate() {
            let face_id = FaceId::generate();
            repo.create_identity(&Observation {
                face_id,
                timestamp: start + Duration::seconds(i as i64),
                image,
                confidence: 0.9,
                bbox: BoundingBox::new(0.0, 0.0, 2.0, 2.0),
            })
            .unwrap();
            ids.push(face_id);
        }
        (repo, ids)
    }

    #[test]
    fn test_exports_one_file_per_face_named_by_id() {
        let image = FaceImage::new(vec![9; 12], 2, 2, 3).unwrap();
        let (repo, ids) = seeded_repo(&[image.clone(), image.clone()]);
        let written = Arc::new(Mutex::new(Vec::new()));
        let use_case = ExportBestFacesUseCase::new(
            Box::new(StubImageWriter {
                written: written.clone(),
            }),
            Some((64, 64)),
        );

        let out = Path::new("/tmp/faces");
        let result = use_case.execute(&repo, out).unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result[0], (ids[0], out.join(format!("{}.png", ids[0]))));
        let calls = written.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].1, image);
        assert_eq!(calls[1].2, Some((64, 64)));
    }

    #[test]
    fn test_empty_crops_are_skipped() {
        let visible = FaceImage::new(vec![1; 4], 2, 2, 1).unwrap();
        let (repo, ids) = seeded_repo(&[FaceImage::empty(3), visible]);
        let written = Arc::new(Mutex::new(Vec::new()));
        let use_case = ExportBestFacesUseCase::new(
            Box::new(StubImageWriter {
                written: written.clone(),
            }),
            None,
        );

        let result = use_case.execute(&repo, Path::new("/tmp/faces")).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].0, ids[1]);
    }

    #[test]
    fn test_writes_real_png_files() {
        use crate::video::infrastructure::image_file_writer::ImageFileWriter;

        let dir = tempfile::tempdir().unwrap();
        let crop = FaceImage::new(vec![200; 27], 3, 3, 3).unwrap();
        let (repo, ids) = seeded_repo(&[crop]);
        let use_case = ExportBestFacesUseCase::new(Box::new(ImageFileWriter::new()), None);

        use_case.execute(&repo, dir.path()).unwrap();

        let decoded = image::open(dir.path().join(format!("{}.png", ids[0])))
            .unwrap()
            .to_rgb8();
        assert_eq!(decoded.dimensions(), (3, 3));
        assert_eq!(decoded.get_pixel(1, 1).0, [200, 200, 200]);
    }
}
