use crate::helpers::{axis_embedding, embedding_at_cosine_distance, spawn_app, StubExtraction};

#[tokio::test(flavor = "multi_thread")]
async fn an_empty_gallery_always_answers_unknown() {
    let app = spawn_app().await;

    let photo = b"anyone".to_vec();
    app.extractor
        .stub(&photo, StubExtraction::Embedding(axis_embedding(0)));

    let response = app.post_identify(photo).await;

    assert_eq!(200, response.status().as_u16());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["identified"], false);
    assert!(body.get("best_distance").is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn an_enrolled_employee_matches_their_own_reference_photo() {
    let app = spawn_app().await;
    let (code, display_name) = app.get_test_employee();

    let photo = b"self-portrait".to_vec();
    app.extractor
        .stub(&photo, StubExtraction::Embedding(axis_embedding(0)));

    app.post_enroll(&code, &display_name, None, photo.clone())
        .await;

    let response = app.post_identify(photo).await;

    assert_eq!(200, response.status().as_u16());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["identified"], true);
    assert_eq!(body["employee_code"], code.as_str());
    assert_eq!(body["display_name"], display_name.as_str());

    // Self-match: distance ~0, confidence ~1
    assert!(body["distance"].as_f64().unwrap() < 1e-3);
    assert!(body["confidence"].as_f64().unwrap() > 0.99);
}

#[tokio::test(flavor = "multi_thread")]
async fn a_probe_within_threshold_is_identified_with_linear_confidence() {
    let app = spawn_app().await;
    let (code, display_name) = app.get_test_employee();

    let reference = b"alice-reference".to_vec();
    let probe = b"alice-at-the-door".to_vec();
    app.extractor
        .stub(&reference, StubExtraction::Embedding(axis_embedding(0)));
    // Cosine distance 0.3 from the reference; threshold is 0.6
    app.extractor.stub(
        &probe,
        StubExtraction::Embedding(embedding_at_cosine_distance(0, 1, 0.3)),
    );

    app.post_enroll(&code, &display_name, None, reference).await;

    let response = app.post_identify(probe).await;

    assert_eq!(200, response.status().as_u16());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["identified"], true);
    assert_eq!(body["employee_code"], code.as_str());
    assert!((body["distance"].as_f64().unwrap() - 0.3).abs() < 1e-3);
    assert!((body["confidence"].as_f64().unwrap() - 0.5).abs() < 1e-2);
}

#[tokio::test(flavor = "multi_thread")]
async fn a_probe_beyond_threshold_answers_unknown_with_the_best_distance() {
    let app = spawn_app().await;
    let (code, display_name) = app.get_test_employee();

    let reference = b"alice-reference".to_vec();
    let probe = b"a-stranger".to_vec();
    app.extractor
        .stub(&reference, StubExtraction::Embedding(axis_embedding(0)));
    // Cosine distance 0.9 from the reference, beyond the 0.6 threshold
    app.extractor.stub(
        &probe,
        StubExtraction::Embedding(embedding_at_cosine_distance(0, 1, 0.9)),
    );

    app.post_enroll(&code, &display_name, None, reference).await;

    let response = app.post_identify(probe).await;

    assert_eq!(200, response.status().as_u16());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["identified"], false);
    assert!((body["best_distance"].as_f64().unwrap() - 0.9).abs() < 1e-3);
    assert!(body.get("employee_code").is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn two_employees_tied_at_the_best_distance_cannot_be_confirmed() {
    let app = spawn_app().await;
    let (alice_code, alice_name) = app.get_test_employee();
    let (bob_code, bob_name) = app.get_test_employee();

    // alice along axis 0, bob along axis 1: the probe halfway between
    // them is at the same cosine distance (~0.29) from both.
    let alice_photo = b"alice".to_vec();
    let bob_photo = b"bob".to_vec();
    let probe = b"who-is-this".to_vec();
    app.extractor
        .stub(&alice_photo, StubExtraction::Embedding(axis_embedding(0)));
    app.extractor
        .stub(&bob_photo, StubExtraction::Embedding(axis_embedding(1)));
    let mut halfway = vec![0.0; 128];
    halfway[0] = std::f32::consts::FRAC_1_SQRT_2;
    halfway[1] = std::f32::consts::FRAC_1_SQRT_2;
    app.extractor
        .stub(&probe, StubExtraction::Embedding(halfway));

    app.post_enroll(&alice_code, &alice_name, None, alice_photo)
        .await;
    app.post_enroll(&bob_code, &bob_name, None, bob_photo).await;

    let response = app.post_identify(probe).await;

    // Explicitly ambiguous, not an arbitrary pick
    assert_eq!(409, response.status().as_u16());
    let body: serde_json::Value = response.json().await.unwrap();
    let message = body["error"].as_str().unwrap();
    assert!(message.contains(&alice_code) && message.contains(&bob_code));
}

#[tokio::test(flavor = "multi_thread")]
async fn a_probe_without_a_face_is_a_typed_failure_not_unknown() {
    let app = spawn_app().await;

    let photo = b"empty-frame".to_vec();
    app.extractor.stub(&photo, StubExtraction::NoFace);

    let response = app.post_identify(photo).await;

    assert_eq!(400, response.status().as_u16());
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body.get("identified").is_none());
    assert!(body["error"].as_str().is_some());
}
