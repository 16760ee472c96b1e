#[cfg(test)]
mod tests {
    use crate::models::CourseLevel;
    use crate::test::test_db::{
        ADMIN_EMAIL, TestDb, TestDbBuilder, login_test_user, setup_test_client,
    };
    use rocket::http::{ContentType, Status};
    use rocket::local::asynchronous::Client;
    use serde_json::{Value, json};

    async fn algebra_db() -> TestDb {
        TestDbBuilder::new()
            .learner("alice")
            .admin("root")
            .course("Algebra Basics", CourseLevel::Beginner, 2)
            .course("Calculus", CourseLevel::Advanced, 0)
            .lesson("Algebra Basics", "Variables", 1, Some(10))
            .lesson("Algebra Basics", "Equations", 2, Some(15))
            .build()
            .await
            .expect("Failed to build test database")
    }

    async fn learner_client(test_db: &TestDb) -> Client {
        let client = setup_test_client(test_db.pool.clone()).await;
        assert_eq!(
            login_test_user(&client, "alice", "alice@mathlearn.test").await,
            Status::SeeOther
        );
        client
    }

    async fn admin_client(test_db: &TestDb) -> Client {
        let client = setup_test_client(test_db.pool.clone()).await;
        assert_eq!(
            login_test_user(&client, "root", ADMIN_EMAIL).await,
            Status::SeeOther
        );
        client
    }

    async fn get_json(client: &Client, uri: String) -> (Status, Value) {
        let response = client.get(uri).dispatch().await;
        let status = response.status();
        let body = response.into_json::<Value>().await.unwrap_or(Value::Null);
        (status, body)
    }

    async fn post_json(client: &Client, uri: String, body: Value) -> (Status, Value) {
        let response = client
            .post(uri)
            .header(ContentType::JSON)
            .body(body.to_string())
            .dispatch()
            .await;
        let status = response.status();
        let body = response.into_json::<Value>().await.unwrap_or(Value::Null);
        (status, body)
    }

    #[rocket::async_test]
    async fn test_health_needs_no_session() {
        let test_db = algebra_db().await;
        let client = setup_test_client(test_db.pool.clone()).await;

        let response = client.get("/api/health").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.into_string().await.unwrap(), "OK");
    }

    #[rocket::async_test]
    async fn test_auth_required_apis() {
        let test_db = algebra_db().await;
        let client = setup_test_client(test_db.pool.clone()).await;

        let endpoints = [
            "/api/auth/user",
            "/api/courses",
            "/api/user/stats",
            "/api/user/progress",
            "/api/user/achievements",
        ];

        for endpoint in endpoints {
            let (status, body) = get_json(&client, endpoint.to_string()).await;
            assert_eq!(status, Status::Unauthorized, "{} did not require a session", endpoint);
            assert_eq!(body["loginUrl"], "/api/login");
        }
    }

    #[rocket::async_test]
    async fn test_login_without_identity_redirects_to_provider() {
        let test_db = algebra_db().await;
        let client = setup_test_client(test_db.pool.clone()).await;

        let response = client.get("/api/login").dispatch().await;
        assert_eq!(response.status(), Status::SeeOther);
        assert_eq!(response.headers().get_one("Location"), Some("/oauth2/start"));
    }

    #[rocket::async_test]
    async fn test_login_establishes_session() {
        let test_db = algebra_db().await;
        let client = setup_test_client(test_db.pool.clone()).await;

        let status = login_test_user(&client, "new-subject", "newbie@mathlearn.test").await;
        assert_eq!(status, Status::SeeOther);

        let (status, body) = get_json(&client, "/api/auth/user".to_string()).await;
        assert_eq!(status, Status::Ok);
        assert_eq!(body["id"], "new-subject");
        assert_eq!(body["email"], "newbie@mathlearn.test");
        assert_eq!(body["role"], "learner");
    }

    #[rocket::async_test]
    async fn test_admin_email_gets_admin_role() {
        let test_db = algebra_db().await;
        let client = admin_client(&test_db).await;

        let (status, body) = get_json(&client, "/api/auth/user".to_string()).await;
        assert_eq!(status, Status::Ok);
        assert_eq!(body["role"], "admin");
    }

    #[rocket::async_test]
    async fn test_logout_revokes_session() {
        let test_db = algebra_db().await;
        let client = learner_client(&test_db).await;

        let response = client.get("/api/logout").dispatch().await;
        assert_eq!(response.status(), Status::SeeOther);

        let (status, _) = get_json(&client, "/api/auth/user".to_string()).await;
        assert_eq!(status, Status::Unauthorized);
    }

    #[rocket::async_test]
    async fn test_catalog_reads() {
        let test_db = algebra_db().await;
        let client = learner_client(&test_db).await;
        let course_id = test_db.course_id("Algebra Basics").unwrap();
        let lesson_id = test_db.lesson_id("Variables").unwrap();

        let (status, courses) = get_json(&client, "/api/courses".to_string()).await;
        assert_eq!(status, Status::Ok);
        assert_eq!(courses[0]["title"], "Algebra Basics");
        assert_eq!(courses[1]["level"], "advanced");

        let (status, lessons) = get_json(&client, format!("/api/courses/{}/lessons", course_id)).await;
        assert_eq!(status, Status::Ok);
        assert_eq!(lessons.as_array().map(Vec::len), Some(2));

        let (status, lesson) = get_json(&client, format!("/api/lessons/{}", lesson_id)).await;
        assert_eq!(status, Status::Ok);
        assert_eq!(lesson["title"], "Variables");
        assert_eq!(lesson["structuredContent"]["theory"], "About Variables");
    }

    #[rocket::async_test]
    async fn test_missing_resources_are_404() {
        let test_db = algebra_db().await;
        let client = learner_client(&test_db).await;

        for uri in [
            "/api/courses/9999",
            "/api/courses/9999/lessons",
            "/api/lessons/9999",
            "/api/lessons/9999/quiz",
            "/api/lessons/9999/navigation",
            "/api/user/progress/course/9999/summary",
        ] {
            let (status, body) = get_json(&client, uri.to_string()).await;
            assert_eq!(status, Status::NotFound, "{}", uri);
            assert_eq!(body["error"], "Not Found");
        }
    }

    #[rocket::async_test]
    async fn test_lesson_navigation() {
        let test_db = algebra_db().await;
        let client = learner_client(&test_db).await;
        let first = test_db.lesson_id("Variables").unwrap();
        let second = test_db.lesson_id("Equations").unwrap();

        let (status, nav) = get_json(&client, format!("/api/lessons/{}/navigation", first)).await;
        assert_eq!(status, Status::Ok);
        assert_eq!(nav["previousLessonId"], Value::Null);
        assert_eq!(nav["nextLessonId"], second);
        assert_eq!(nav["position"], 1);
        assert_eq!(nav["total"], 2);
    }

    #[rocket::async_test]
    async fn test_stats_are_null_until_recorded() {
        let test_db = algebra_db().await;
        let client = learner_client(&test_db).await;

        let (status, body) = get_json(&client, "/api/user/stats".to_string()).await;
        assert_eq!(status, Status::Ok);
        assert_eq!(body, Value::Null);
    }

    #[rocket::async_test]
    async fn test_progress_update_and_summary() {
        let test_db = algebra_db().await;
        let client = learner_client(&test_db).await;
        let course_id = test_db.course_id("Algebra Basics").unwrap();
        let first = test_db.lesson_id("Variables").unwrap();

        let (status, saved) = post_json(
            &client,
            "/api/user/progress".to_string(),
            json!({"courseId": course_id, "lessonId": first, "completed": true, "score": 90}),
        )
        .await;
        assert_eq!(status, Status::Ok);
        assert_eq!(saved["completed"], true);
        assert!(saved["completedAt"].is_string());

        let (status, summary) =
            get_json(&client, format!("/api/user/progress/course/{}/summary", course_id)).await;
        assert_eq!(status, Status::Ok);
        assert_eq!(summary["completedCount"], 1);
        assert_eq!(summary["progressPercentage"], 50);
        assert_eq!(summary["lessons"][0]["completed"], true);
        assert_eq!(summary["lessons"][1]["locked"], false);

        let (status, overview) = get_json(&client, "/api/user/courses".to_string()).await;
        assert_eq!(status, Status::Ok);
        assert_eq!(overview[0]["progressPercentage"], 50);
        assert_eq!(overview[1]["progressPercentage"], 0);
    }

    #[rocket::async_test]
    async fn test_progress_update_validation() {
        let test_db = algebra_db().await;
        let client = learner_client(&test_db).await;
        let course_id = test_db.course_id("Algebra Basics").unwrap();
        let other_course = test_db.course_id("Calculus").unwrap();
        let lesson_id = test_db.lesson_id("Variables").unwrap();

        let (status, _) = post_json(
            &client,
            "/api/user/progress".to_string(),
            json!({"courseId": 9999, "completed": true}),
        )
        .await;
        assert_eq!(status, Status::NotFound);

        let (status, body) = post_json(
            &client,
            "/api/user/progress".to_string(),
            json!({"courseId": other_course, "lessonId": lesson_id, "completed": true}),
        )
        .await;
        assert_eq!(status, Status::UnprocessableEntity);
        assert!(body["errors"]["lessonId"].is_array());

        let (status, body) = post_json(
            &client,
            "/api/user/progress".to_string(),
            json!({"courseId": course_id, "score": -1}),
        )
        .await;
        assert_eq!(status, Status::UnprocessableEntity);
        assert_eq!(body["status"], "error");
        assert!(body["errors"]["score"].is_array());
    }

    #[rocket::async_test]
    async fn test_learner_cannot_author_catalog() {
        let test_db = algebra_db().await;
        let client = learner_client(&test_db).await;
        let course_id = test_db.course_id("Algebra Basics").unwrap();

        let (status, body) = post_json(
            &client,
            "/api/courses".to_string(),
            json!({"title": "Topology", "level": "advanced"}),
        )
        .await;
        assert_eq!(status, Status::Forbidden);
        assert!(body["errors"]["permission"].is_array());

        let (status, _) = post_json(
            &client,
            format!("/api/courses/{}/lessons", course_id),
            json!({"title": "Sneaky", "position": 3}),
        )
        .await;
        assert_eq!(status, Status::Forbidden);

        let response = client
            .put("/api/admin/users/alice/stats")
            .header(ContentType::JSON)
            .body(json!({"totalXP": 9000}).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);
    }

    #[rocket::async_test]
    async fn test_admin_authoring_flow() {
        let test_db = algebra_db().await;
        let client = admin_client(&test_db).await;

        let (status, course) = post_json(
            &client,
            "/api/courses".to_string(),
            json!({"title": "Trigonometry", "level": "intermediate", "totalLessons": 1}),
        )
        .await;
        assert_eq!(status, Status::Created);
        let course_id = course["id"].as_i64().unwrap();

        let (status, lesson) = post_json(
            &client,
            format!("/api/courses/{}/lessons", course_id),
            json!({
                "title": "Sine",
                "position": 1,
                "content": {"theory": "Opposite over hypotenuse", "examples": ["sin(30°) = 0.5"]}
            }),
        )
        .await;
        assert_eq!(status, Status::Created);
        let lesson_id = lesson["id"].as_i64().unwrap();

        let (status, duplicate) = post_json(
            &client,
            format!("/api/courses/{}/lessons", course_id),
            json!({"title": "Cosine", "position": 1}),
        )
        .await;
        assert_eq!(status, Status::Conflict);
        assert!(duplicate["errors"]["resource"].is_array());

        let (status, _) = post_json(
            &client,
            format!("/api/courses/{}/lessons", course_id),
            json!({"title": "Tangent", "position": 5}),
        )
        .await;
        assert_eq!(status, Status::UnprocessableEntity, "Positions cannot leave gaps");

        let (status, question) = post_json(
            &client,
            format!("/api/lessons/{}/quiz", lesson_id),
            json!({
                "question": "sin(90°)?",
                "options": ["0", "1", "-1"],
                "correctAnswer": "B",
                "position": 1
            }),
        )
        .await;
        assert_eq!(status, Status::Created);
        assert_eq!(question["points"], 5);

        let (status, _) = post_json(
            &client,
            format!("/api/lessons/{}/quiz", lesson_id),
            json!({"question": "cos(0°)?", "options": ["0", "1"], "correctAnswer": "B", "position": 1}),
        )
        .await;
        assert_eq!(status, Status::Conflict);

        let (status, _) = post_json(
            &client,
            format!("/api/lessons/{}/quiz", lesson_id),
            json!({"question": "Bad?", "options": ["0"], "correctAnswer": "D", "position": 2}),
        )
        .await;
        assert_eq!(status, Status::UnprocessableEntity);

        let (status, lesson) = get_json(&client, format!("/api/lessons/{}", lesson_id)).await;
        assert_eq!(status, Status::Ok);
        assert_eq!(lesson["structuredContent"]["examples"][0], "sin(30°) = 0.5");
    }

    #[rocket::async_test]
    async fn test_admin_manages_learner_stats_and_achievements() {
        let test_db = algebra_db().await;
        let admin = admin_client(&test_db).await;

        let response = admin
            .put("/api/admin/users/alice/stats")
            .header(ContentType::JSON)
            .body(json!({"totalXP": 250, "currentStreak": 4, "longestStreak": 6}).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let (status, _) = post_json(
            &admin,
            "/api/admin/users/alice/achievements".to_string(),
            json!({"achievementType": "streak", "title": "On Fire"}),
        )
        .await;
        assert_eq!(status, Status::Created);

        let (status, _) = post_json(
            &admin,
            "/api/admin/users/ghost/achievements".to_string(),
            json!({"achievementType": "streak", "title": "Boo"}),
        )
        .await;
        assert_eq!(status, Status::NotFound);

        let learner = learner_client(&test_db).await;

        let (status, stats) = get_json(&learner, "/api/user/stats".to_string()).await;
        assert_eq!(status, Status::Ok);
        assert_eq!(stats["totalXP"], 250);
        assert_eq!(stats["longestStreak"], 6);

        let (status, achievements) = get_json(&learner, "/api/user/achievements".to_string()).await;
        assert_eq!(status, Status::Ok);
        assert_eq!(achievements[0]["title"], "On Fire");
    }
}
