use crate::helpers::{axis_embedding, embedding_at_cosine_distance, spawn_app, StubExtraction};

#[tokio::test(flavor = "multi_thread")]
async fn enrolled_employees_are_listed_with_their_sample_counts() {
    let app = spawn_app().await;
    let (code, display_name) = app.get_test_employee();

    let first = b"ref-1".to_vec();
    let second = b"ref-2".to_vec();
    app.extractor
        .stub(&first, StubExtraction::Embedding(axis_embedding(0)));
    app.extractor.stub(
        &second,
        StubExtraction::Embedding(embedding_at_cosine_distance(0, 1, 0.4)),
    );

    app.post_enroll(&code, &display_name, None, first).await;
    app.post_enroll(&code, &display_name, None, second).await;

    let response = reqwest::Client::new()
        .get(&format!("{}/employees", &app.address))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(200, response.status().as_u16());
    let body: serde_json::Value = response.json().await.unwrap();
    let employees = body.as_array().unwrap();
    assert_eq!(employees.len(), 1);
    assert_eq!(employees[0]["code"], code.as_str());
    assert_eq!(employees[0]["display_name"], display_name.as_str());
    assert_eq!(employees[0]["sample_count"], 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn deregistering_an_employee_removes_all_their_records() {
    let app = spawn_app().await;
    let (code, display_name) = app.get_test_employee();

    let photo = b"reference".to_vec();
    app.extractor
        .stub(&photo, StubExtraction::Embedding(axis_embedding(0)));
    app.post_enroll(&code, &display_name, None, photo.clone())
        .await;

    let response = reqwest::Client::new()
        .delete(&format!("{}/employees/{}", &app.address, code))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(200, response.status().as_u16());

    // No orphan vectors
    let embeddings: (i64,) = sqlx::query_as(r#"SELECT COUNT(*) FROM face_embeddings"#)
        .fetch_one(&app.db_pool)
        .await
        .unwrap();
    assert_eq!(embeddings.0, 0);
    let employees: (i64,) = sqlx::query_as(r#"SELECT COUNT(*) FROM employees"#)
        .fetch_one(&app.db_pool)
        .await
        .unwrap();
    assert_eq!(employees.0, 0);

    // A probe that used to match now resolves to unknown
    let identify = app.post_identify(photo).await;
    assert_eq!(200, identify.status().as_u16());
    let body: serde_json::Value = identify.json().await.unwrap();
    assert_eq!(body["identified"], false);
}

#[tokio::test(flavor = "multi_thread")]
async fn deregistering_an_unknown_employee_is_a_404() {
    let app = spawn_app().await;

    let response = reqwest::Client::new()
        .delete(&format!("{}/employees/{}", &app.address, "emp-nobody"))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(404, response.status().as_u16());
}
