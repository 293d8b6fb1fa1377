mod common;

use anyhow::Result;
use common::{error_kind, TestServer};
use reqwest::StatusCode;
use serde_json::json;

/// A protocol owned by `token` holding `tasks` in the given order
async fn protocol_with_tasks(server: &TestServer, token: &str, tasks: &[&str]) -> Result<(i64, Vec<i64>)> {
    let protocol = server.create(token, "protocols", "Gait").await?;
    let mut ids = Vec::new();
    for name in tasks {
        let task = server.create(token, "tasks", name).await?;
        let (status, body) = server
            .post(&format!("/api/protocols/{}/tasks", protocol), token, json!({ "child_id": task }))
            .await?;
        anyhow::ensure!(status == StatusCode::CREATED, "insert failed: {}", body);
        ids.push(task);
    }
    Ok((protocol, ids))
}

#[tokio::test]
async fn insert_at_positions() -> Result<()> {
    let server = TestServer::start().await?;
    let token = server.register_and_login("alice").await?;
    let (protocol, tasks) = protocol_with_tasks(&server, &token, &["Walk", "Turn"]).await?;
    let path = format!("/api/protocols/{}/tasks", protocol);

    let front = server.create(&token, "tasks", "Stand").await?;
    let (status, body) = server
        .post(&path, &token, json!({ "child_id": front, "position": 1 }))
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["position"], 1);
    assert_eq!(body["data"]["shifted"], 2);

    assert_eq!(
        server.order(&token, &path).await?,
        vec![(front, 1), (tasks[0], 2), (tasks[1], 3)]
    );

    // already a member
    let (status, body) = server.post(&path, &token, json!({ "child_id": front })).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_kind(&body), "ConflictError");

    let extra = server.create(&token, "tasks", "Sit").await?;
    for position in [0, 5] {
        let (status, body) = server
            .post(&path, &token, json!({ "child_id": extra, "position": position }))
            .await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_kind(&body), "ValidationError");
    }

    let (status, _) = server.post(&path, &token, json!({ "child_id": 9999 })).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = server
        .post("/api/protocols/9999/tasks", &token, json!({ "child_id": extra }))
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = server.get("/api/protocols/9999/tasks", &token).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn move_and_remove_keep_orderings_dense() -> Result<()> {
    let server = TestServer::start().await?;
    let token = server.register_and_login("alice").await?;
    let (protocol, t) = protocol_with_tasks(&server, &token, &["A", "B", "C", "D"]).await?;
    let path = format!("/api/protocols/{}/tasks", protocol);

    let (status, body) = server
        .patch(&format!("{}/{}", path, t[0]), &token, json!({ "position": 3 }))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["from"], 1);
    assert_eq!(body["data"]["to"], 3);
    assert_eq!(
        server.order(&token, &path).await?,
        vec![(t[1], 1), (t[2], 2), (t[0], 3), (t[3], 4)]
    );

    let (_, body) = server
        .patch(&format!("{}/{}", path, t[0]), &token, json!({ "position": 3 }))
        .await?;
    assert_eq!(body["data"]["moved"], false);

    let (status, _) = server
        .patch(&format!("{}/{}", path, t[0]), &token, json!({ "position": 5 }))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = server.delete(&format!("{}/{}", path, t[2]), &token).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["position"], 2);
    assert_eq!(body["data"]["shifted"], 2);
    assert_eq!(
        server.order(&token, &path).await?,
        vec![(t[1], 1), (t[0], 2), (t[3], 3)]
    );

    let (status, _) = server.delete(&format!("{}/{}", path, t[2]), &token).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn bulk_reorder_requires_the_full_set() -> Result<()> {
    let server = TestServer::start().await?;
    let token = server.register_and_login("alice").await?;
    let (protocol, t) = protocol_with_tasks(&server, &token, &["A", "B", "C"]).await?;
    let path = format!("/api/protocols/{}/tasks", protocol);

    let (status, body) = server
        .put(
            &path,
            &token,
            json!({ "assignments": [
                { "child_id": t[2], "order_index": 1 },
                { "child_id": t[0], "order_index": 2 },
                { "child_id": t[1], "order_index": 3 },
            ]}),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["updated"], 3);
    assert_eq!(server.order(&token, &path).await?, vec![(t[2], 1), (t[0], 2), (t[1], 3)]);

    let partial = json!({ "assignments": [
        { "child_id": t[0], "order_index": 1 },
        { "child_id": t[2], "order_index": 2 },
    ]});
    let (status, body) = server.put(&path, &token, partial).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_kind(&body), "ConflictError");

    let stranger = server.create(&token, "tasks", "Z").await?;
    let (status, _) = server
        .put(
            &path,
            &token,
            json!({ "assignments": [
                { "child_id": t[0], "order_index": 1 },
                { "child_id": t[1], "order_index": 2 },
                { "child_id": stranger, "order_index": 3 },
            ]}),
        )
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = server.put(&path, &token, json!({ "assignments": [] })).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // failed attempts leave the ordering alone
    assert_eq!(server.order(&token, &path).await?, vec![(t[2], 1), (t[0], 2), (t[1], 3)]);
    Ok(())
}

#[tokio::test]
async fn ordering_changes_need_owner_or_admin() -> Result<()> {
    let server = TestServer::start().await?;
    let alice = server.register_and_login("alice").await?;
    let bob = server.register_and_login("bob").await?;
    let admin = server.admin("root").await?;
    let (protocol, t) = protocol_with_tasks(&server, &alice, &["A", "B"]).await?;
    let path = format!("/api/protocols/{}/tasks", protocol);
    let extra = server.create(&bob, "tasks", "C").await?;

    let attempts = [
        server.post(&path, &bob, json!({ "child_id": extra })).await?,
        server
            .patch(&format!("{}/{}", path, t[0]), &bob, json!({ "position": 2 }))
            .await?,
        server
            .put(&format!("{}/{}", path, t[0]), &bob, json!({ "rating": 3 }))
            .await?,
        server.delete(&format!("{}/{}", path, t[0]), &bob).await?,
        server
            .put(
                &path,
                &bob,
                json!({ "assignments": [
                    { "child_id": t[1], "order_index": 1 },
                    { "child_id": t[0], "order_index": 2 },
                ]}),
            )
            .await?,
        server
            .post(
                "/api/resequence",
                &bob,
                json!({ "relation": "protocol-tasks", "parent_id": protocol }),
            )
            .await?,
    ];
    for (status, body) in attempts {
        assert_eq!(status, StatusCode::FORBIDDEN, "{}", body);
        assert_eq!(error_kind(&body), "AuthorizationError");
    }

    // reading is open to everyone
    assert_eq!(server.order(&bob, &path).await?, vec![(t[0], 1), (t[1], 2)]);

    let (status, _) = server
        .patch(&format!("{}/{}", path, t[0]), &admin, json!({ "position": 2 }))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(server.order(&alice, &path).await?, vec![(t[1], 1), (t[0], 2)]);
    Ok(())
}

#[tokio::test]
async fn membership_details_and_associations() -> Result<()> {
    let server = TestServer::start().await?;
    let token = server.register_and_login("alice").await?;

    let protocol = server.create(&token, "protocols", "Gait").await?;
    let task = server.create(&token, "tasks", "Walk").await?;
    let imu = server.create(&token, "sensors", "IMU").await?;
    let mat = server.create(&token, "sensors", "Pressure mat").await?;
    server
        .put(&format!("/api/tasks/{}/sensors", task), &token, json!({ "ids": [imu] }))
        .await?;

    let path = format!("/api/protocols/{}/tasks", protocol);
    let (_, body) = server.post(&path, &token, json!({ "child_id": task })).await?;
    let membership = body["data"]["membership_id"].as_i64().unwrap_or_default();
    assert_eq!(body["data"]["copied_associations"], 1);

    let membership_path = format!("/api/memberships/protocol-tasks/{}/sensors", membership);
    let (status, body) = server.get(&membership_path, &token).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["ids"], json!([imu]));

    let (status, body) = server.put(&membership_path, &token, json!({ "ids": [mat] })).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["ids"], json!([mat]));

    // the child's defaults are untouched by the override
    let (_, body) = server.get(&format!("/api/tasks/{}/sensors", task), &token).await?;
    assert_eq!(body["data"], json!([imu]));

    let (status, _) = server
        .get(&format!("/api/memberships/protocol-sections/{}/sensors", membership), &token)
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = server
        .get(&format!("/api/memberships/bogus/{}/sensors", membership), &token)
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = server
        .put(
            &format!("{}/{}", path, task),
            &token,
            json!({ "rating": 4, "notes": "barefoot" }),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["rating"], 4);
    assert_eq!(body["data"]["notes"], "barefoot");
    assert_eq!(body["data"]["order_index"], 1);
    Ok(())
}

#[tokio::test]
async fn resequence_repairs_gaps() -> Result<()> {
    let server = TestServer::start().await?;
    let token = server.register_and_login("alice").await?;

    let section = server.create(&token, "sections", "Upper body").await?;
    let mut subsections = Vec::new();
    for name in ["Reach", "Grip", "Lift"] {
        let id = server.create(&token, "subsections", name).await?;
        server
            .post(&format!("/api/sections/{}/subsections", section), &token, json!({ "child_id": id }))
            .await?;
        subsections.push(id);
    }

    // damage the ordering behind the API's back
    sqlx::query("UPDATE section_subsections SET order_index = order_index * 10 WHERE section_id = ?")
        .bind(section)
        .execute(&server.pool)
        .await?;

    let (status, body) = server
        .post(
            "/api/resequence",
            &token,
            json!({ "relation": "section_subsections", "parent_id": section }),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["relation"], "section-subsections");
    assert_eq!(body["data"]["updated"], 3);

    let path = format!("/api/sections/{}/subsections", section);
    assert_eq!(
        server.order(&token, &path).await?,
        vec![(subsections[0], 1), (subsections[1], 2), (subsections[2], 3)]
    );

    let (status, body) = server
        .post("/api/resequence", &token, json!({ "relation": "nope", "parent_id": section }))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["field_errors"]["relation"].is_string());
    Ok(())
}

#[tokio::test]
async fn protocol_sections_are_ordered_too() -> Result<()> {
    let server = TestServer::start().await?;
    let token = server.register_and_login("alice").await?;

    let protocol = server.create(&token, "protocols", "Full exam").await?;
    let s1 = server.create(&token, "sections", "Lower").await?;
    let s2 = server.create(&token, "sections", "Upper").await?;
    let path = format!("/api/protocols/{}/sections", protocol);

    server.post(&path, &token, json!({ "child_id": s1 })).await?;
    let (status, body) = server
        .post(&path, &token, json!({ "child_id": s2, "position": 1 }))
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["copied_associations"], 0);
    assert_eq!(server.order(&token, &path).await?, vec![(s2, 1), (s1, 2)]);
    Ok(())
}
