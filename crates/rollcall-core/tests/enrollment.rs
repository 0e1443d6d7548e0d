use rollcall_core::{
    EnrollmentCoordinator, FaceImage, IdentityModel, MatchError, Matcher, ModelStore,
    NearestNeighborMatcher, RecognitionConfig, SampleStore,
};
use tempfile::TempDir;

const FACE: u32 = 100;

/// Deterministic synthetic "face": a bright blob whose center depends on the
/// identity, with a small per-sample brightness shift.
fn face(identity: u32, sample: u32) -> FaceImage {
    let (cx, cy) = match identity {
        0 => (30.0, 30.0),
        1 => (70.0, 70.0),
        _ => (30.0, 70.0),
    };
    let mut data = Vec::with_capacity((FACE * FACE) as usize);
    for y in 0..FACE {
        for x in 0..FACE {
            let d2 = (x as f32 - cx).powi(2) + (y as f32 - cy).powi(2);
            let v = 40.0 + 200.0 * (-d2 / 300.0).exp() + sample as f32;
            data.push(v.min(255.0) as u8);
        }
    }
    FaceImage::new(FACE, FACE, data).unwrap()
}

fn crops(identity: u32) -> Vec<FaceImage> {
    (0..5).map(|s| face(identity, s)).collect()
}

fn open(dir: &TempDir) -> EnrollmentCoordinator {
    EnrollmentCoordinator::open(
        RecognitionConfig::default(),
        ModelStore::new(dir.path().join("face_recognition_model.json")),
        SampleStore::new(dir.path().join("faces")),
    )
}

#[test]
fn enroll_two_students_keeps_first_recognizable() {
    let dir = TempDir::new().unwrap();
    let coordinator = open(&dir);
    assert!(!coordinator.is_trained());

    let first = crops(0);
    coordinator.enroll_images("S001", &first).unwrap();
    assert!(coordinator.is_trained());

    let hit = coordinator.recognize(&first[2]).unwrap();
    assert_eq!(hit.label.as_deref(), Some("S001"));
    assert!(hit.confidence > coordinator.matcher().min_confidence());

    coordinator.enroll_images("S002", &crops(1)).unwrap();

    let again = coordinator.recognize(&first[2]).unwrap();
    assert_eq!(again.label.as_deref(), Some("S001"));
    assert_eq!(
        coordinator.recognize(&face(1, 3)).unwrap().label.as_deref(),
        Some("S002")
    );
}

#[test]
fn stranger_is_not_recognized() {
    let dir = TempDir::new().unwrap();
    let coordinator = open(&dir);
    coordinator.enroll_images("A", &crops(0)).unwrap();

    let result = coordinator.recognize(&face(2, 0)).unwrap();
    assert_eq!(result.label, None);
}

#[test]
fn persisted_model_matches_identically() {
    let dir = TempDir::new().unwrap();
    let coordinator = open(&dir);
    coordinator.enroll_images("S001", &crops(0)).unwrap();
    coordinator.enroll_images("S002", &crops(1)).unwrap();

    let live = coordinator.snapshot();
    let loaded = ModelStore::new(dir.path().join("face_recognition_model.json"))
        .load()
        .unwrap()
        .unwrap();

    let matcher = NearestNeighborMatcher::new(RecognitionConfig::default().max_distance);
    for probe in [face(0, 4), face(1, 0), face(2, 2)] {
        assert_eq!(
            matcher.match_face(&live, &probe).unwrap(),
            matcher.match_face(&loaded, &probe).unwrap()
        );
    }
}

#[test]
fn untrained_model_refuses_to_match() {
    let matcher = NearestNeighborMatcher::new(0.3);
    let err = matcher.match_face(&IdentityModel::empty(), &face(0, 0)).unwrap_err();
    assert!(matches!(err, MatchError::ModelNotTrained));
}

#[test]
fn rebuild_from_imported_folders() {
    let training = TempDir::new().unwrap();
    for (label, identity) in [("alice", 0), ("bob", 1)] {
        let dir = training.path().join(label);
        std::fs::create_dir(&dir).unwrap();
        for (i, img) in crops(identity).iter().enumerate() {
            img.to_gray_image().save(dir.join(format!("{i}.png"))).unwrap();
        }
    }

    let dir = TempDir::new().unwrap();
    let coordinator = open(&dir);
    let imported = coordinator
        .sample_store()
        .import_dir(training.path(), FACE)
        .unwrap();
    assert_eq!(imported, 10);

    let summary = coordinator.rebuild().unwrap();
    assert_eq!(summary.labels, vec!["alice", "bob"]);
    assert_eq!(
        coordinator.recognize(&face(1, 2)).unwrap().label.as_deref(),
        Some("bob")
    );
}
