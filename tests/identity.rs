mod common;

use std::sync::mpsc;
use std::sync::Arc;

use common::{solid, ColorAnalyzer, POISON};
use epiwatch::dispatch::{Dispatch, IdentityDispatcher};
use epiwatch::{
    CompliancePolicy, ComplianceState, FaceBox, FaceName, Gallery, IdentityMatcher,
    ReferenceIdentity, Session,
};
use ndarray::Array1;

fn gallery() -> Arc<Gallery> {
    let entry = |name: &str, v: [f32; 3]| ReferenceIdentity {
        name: name.to_string(),
        embedding: Array1::from(v.to_vec()),
    };
    Arc::new(
        Gallery::new(vec![
            entry("Alice", [100.0, 100.0, 100.0]),
            entry("Bob", [150.0, 100.0, 100.0]),
        ])
        .unwrap(),
    )
}

fn matcher() -> Arc<IdentityMatcher> {
    Arc::new(IdentityMatcher::new(gallery(), 15.0))
}

fn session() -> Session {
    Session::new(ComplianceState::new(
        Vec::<String>::new(),
        0.3,
        CompliancePolicy::Latching,
    ))
}

#[test]
fn live_face_close_to_alice_is_alice() {
    // 10 from Alice, 40 from Bob
    let frame = solid([110, 100, 100]);
    let mut analyzer = ColorAnalyzer::new(vec![FaceBox::new(0, 0, 16, 16)]);
    let matches = matcher().match_faces(&mut analyzer, &frame).unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].name, FaceName::Identified("Alice".into()));
}

#[test]
fn faces_are_clamped_and_empty_ones_dropped() {
    let frame = solid([110, 100, 100]);
    let mut analyzer = ColorAnalyzer::new(vec![
        FaceBox::new(-5, -5, 20, 20),
        FaceBox::new(500, 500, 20, 20),
    ]);
    let matches = matcher().match_faces(&mut analyzer, &frame).unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].bbox, FaceBox::new(0, 0, 20, 20));
}

#[test]
fn failed_embedding_drops_only_that_face() {
    let mut frame = solid([255, 0, 0]);
    for x in 32..64 {
        for y in 0..48 {
            frame.put_pixel(x, y, POISON);
        }
    }
    let mut analyzer = ColorAnalyzer::new(vec![
        FaceBox::new(0, 0, 16, 16),
        FaceBox::new(32, 0, 16, 16),
    ]);
    let matches = matcher().match_faces(&mut analyzer, &frame).unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].name, FaceName::Unidentified);
}

#[test]
fn locate_failure_fails_the_run() {
    let mut analyzer = ColorAnalyzer::new(vec![FaceBox::new(0, 0, 16, 16)]);
    analyzer.fail_locate = true;
    assert!(matcher()
        .match_faces(&mut analyzer, &solid([0, 0, 0]))
        .is_err());
}

#[test]
fn dispatch_skips_while_a_run_is_in_flight() {
    let (gate, rx) = mpsc::channel();
    let session = session();
    let analyzer = ColorAnalyzer::gated(vec![FaceBox::new(0, 0, 16, 16)], rx);
    let mut dispatcher = IdentityDispatcher::new(analyzer, matcher(), session.clone());

    let frame = Arc::new(solid([110, 100, 100]));
    assert_eq!(dispatcher.dispatch(Arc::clone(&frame)), Dispatch::Started);
    assert_eq!(dispatcher.dispatch(Arc::clone(&frame)), Dispatch::Skipped);
    assert_eq!(dispatcher.dispatch(Arc::clone(&frame)), Dispatch::Skipped);
    assert!(session.faces().is_empty());

    gate.send(()).unwrap();
    dispatcher.wait();
    assert!(!dispatcher.in_flight());
    assert_eq!(session.faces().len(), 1);
    assert_eq!(dispatcher.started(), 1);

    // the analyzer came back and can run again
    gate.send(()).unwrap();
    assert_eq!(dispatcher.dispatch(frame), Dispatch::Started);
    dispatcher.wait();
    assert_eq!(dispatcher.started(), 2);
}

#[test]
fn failed_run_publishes_an_empty_set() {
    let session = session();
    session.publish_faces(vec![epiwatch::FaceMatch {
        bbox: FaceBox::new(0, 0, 4, 4),
        name: FaceName::Identified("Alice".into()),
    }]);
    let mut analyzer = ColorAnalyzer::new(vec![]);
    analyzer.fail_locate = true;
    let mut dispatcher = IdentityDispatcher::new(analyzer, matcher(), session.clone());

    assert_eq!(dispatcher.dispatch(Arc::new(solid([0, 0, 0]))), Dispatch::Started);
    dispatcher.wait();
    assert!(session.faces().is_empty());
}

#[test]
fn results_replace_rather_than_merge() {
    let (gate, rx) = mpsc::channel();
    let session = session();
    let analyzer = ColorAnalyzer::gated(vec![FaceBox::new(0, 0, 16, 16)], rx);
    let mut dispatcher = IdentityDispatcher::new(analyzer, matcher(), session.clone());

    gate.send(()).unwrap();
    dispatcher.dispatch(Arc::new(solid([110, 100, 100])));
    dispatcher.wait();
    assert_eq!(session.faces()[0].name, FaceName::Identified("Alice".into()));

    gate.send(()).unwrap();
    dispatcher.dispatch(Arc::new(solid([148, 100, 100])));
    dispatcher.wait();
    let faces = session.faces();
    assert_eq!(faces.len(), 1);
    assert_eq!(faces[0].name, FaceName::Identified("Bob".into()));
}

#[test]
fn unknown_faces_are_unidentified() {
    let frame = solid([0, 0, 0]);
    let mut analyzer = ColorAnalyzer::new(vec![FaceBox::new(0, 0, 16, 16)]);
    let matches = matcher().match_faces(&mut analyzer, &frame).unwrap();
    assert_eq!(matches[0].name, FaceName::Unidentified);
    assert_eq!(matches[0].name.to_string(), "unidentified");
}

#[test]
fn default_threshold_rejects_distant_unit_embeddings() {
    use epiwatch::config::Config;
    use epiwatch_vision::face::{l2_normalize, MAX_EMBEDDING_DISTANCE};

    let unit = |v: [f32; 4]| l2_normalize(Array1::from(v.to_vec()));
    let gallery = Gallery::new(vec![ReferenceIdentity {
        name: "Alice".to_string(),
        embedding: unit([1.0, 0.0, 0.0, 0.0]),
    }])
    .unwrap();
    let threshold = Config::default().face_threshold;
    assert!(threshold < MAX_EMBEDDING_DISTANCE);
    let m = IdentityMatcher::new(Arc::new(gallery), threshold);

    assert_eq!(m.identify(&unit([-1.0, 0.0, 0.0, 0.0])), FaceName::Unidentified);
    assert_eq!(m.identify(&unit([0.0, 1.0, 0.0, 0.0])), FaceName::Unidentified);
    assert_eq!(
        m.identify(&unit([1.0, 0.2, 0.0, 0.0])),
        FaceName::Identified("Alice".into())
    );
}
