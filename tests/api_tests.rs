mod common;

use reqwest::StatusCode;
use serde_json::{json, Value};

use common::{PASSWORD, ROOT_EMAIL};

// ── Health ──────────────────────────────────────────────────────

#[tokio::test]
async fn health_returns_ok() {
    let app = common::spawn_app().await;

    let resp = app.client.get(app.url("/health")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "ok");

    common::cleanup(app).await;
}

#[tokio::test]
async fn detailed_health_checks_database() {
    let app = common::spawn_app().await;

    let resp = app
        .client
        .get(app.url("/api/v1/health/detailed"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["x-content-type-options"], "nosniff");
    assert_eq!(resp.headers()["x-frame-options"], "DENY");
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"]["database"]["status"], "healthy");

    common::cleanup(app).await;
}

// ── Auth ────────────────────────────────────────────────────────

#[tokio::test]
async fn login_valid_credentials() {
    let app = common::spawn_app().await;

    let (body, status) = app.login("EOMER@edoras.test", PASSWORD).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["access_token"].is_string());
    assert!(body["refresh_token"].is_string());
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["user"]["email"], ROOT_EMAIL);
    assert!(body["user"].get("password_hash").is_none());

    common::cleanup(app).await;
}

#[tokio::test]
async fn login_invalid_credentials() {
    let app = common::spawn_app().await;

    let (body, status) = app.login(ROOT_EMAIL, "wrong-password").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid credentials");

    let (_, status) = app.login("nobody@edoras.test", PASSWORD).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    common::cleanup(app).await;
}

#[tokio::test]
async fn login_missing_fields_is_validation_error() {
    let app = common::spawn_app().await;

    let resp = app
        .client
        .post(app.url("/api/v1/auth/login"))
        .json(&json!({ "email": ROOT_EMAIL }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Validation failed");
    assert!(body["details"]["password"].is_array());

    common::cleanup(app).await;
}

#[tokio::test]
async fn login_inactive_user_is_forbidden() {
    let app = common::spawn_app().await;
    let (id, email) = app.create_user("grima", Some("dunedain"), None).await;
    sqlx::query("UPDATE users SET is_active = false WHERE id = $1")
        .bind(id)
        .execute(&app.pool)
        .await
        .unwrap();

    let (_, status) = app.login(&email, PASSWORD).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    common::cleanup(app).await;
}

#[tokio::test]
async fn login_rate_limited_after_repeated_failures() {
    let app = common::spawn_app().await;

    for _ in 0..5 {
        let (_, status) = app.login(ROOT_EMAIL, "wrong-password").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    // Even the right password is refused while the window is open
    let (body, status) = app.login(ROOT_EMAIL, PASSWORD).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(body["error"].as_str().unwrap().contains("Too many login attempts"));

    common::cleanup(app).await;
}

#[tokio::test]
async fn requests_without_token_are_unauthorized() {
    let app = common::spawn_app().await;

    let resp = app.client.get(app.url("/api/v1/users")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let (_, status) = app.get_auth("/api/v1/users", "not-a-jwt").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    common::cleanup(app).await;
}

#[tokio::test]
async fn me_reports_tier_and_permissions() {
    let app = common::spawn_app().await;
    let token = app.root_token().await;

    let (body, status) = app.get_auth("/api/v1/auth/me", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tier"], "rohirrim");
    let permissions = body["user"]["permissions"].as_array().unwrap();
    assert!(permissions.contains(&json!("system.admin")));

    let (_, ranger) = app.user_with_token("halbarad", None, None).await;
    let (body, _) = app.get_auth("/api/v1/auth/me", &ranger).await;
    assert_eq!(body["tier"], "dunedain");
    assert_eq!(body["user"]["access_level"], 999);
    assert_eq!(body["user"]["permissions"], json!([]));

    common::cleanup(app).await;
}

// ── Token Refresh ───────────────────────────────────────────────

async fn refresh_with(app: &common::TestApp, token: &str) -> (Value, StatusCode) {
    let resp = app
        .client
        .post(app.url("/api/v1/auth/refresh"))
        .json(&json!({ "refresh_token": token }))
        .send()
        .await
        .unwrap();
    let status = resp.status();
    (resp.json().await.unwrap_or(json!(null)), status)
}

#[tokio::test]
async fn refresh_token_rotation() {
    let app = common::spawn_app().await;
    let (login, _) = app.login(ROOT_EMAIL, PASSWORD).await;
    let refresh = login["refresh_token"].as_str().unwrap();

    let (body, status) = refresh_with(&app, refresh).await;
    assert_eq!(status, StatusCode::OK);
    let rotated = body["refresh_token"].as_str().unwrap();
    assert_ne!(rotated, refresh);

    // Cookie transport works too
    let resp = app
        .client
        .post(app.url("/api/v1/auth/refresh"))
        .header("cookie", format!("refresh_token={rotated}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    common::cleanup(app).await;
}

#[tokio::test]
async fn refresh_token_reuse_revokes_all_sessions() {
    let app = common::spawn_app().await;
    let (login, _) = app.login(ROOT_EMAIL, PASSWORD).await;
    let original = login["refresh_token"].as_str().unwrap().to_string();

    let (body, _) = refresh_with(&app, &original).await;
    let rotated = body["refresh_token"].as_str().unwrap().to_string();

    let (body, status) = refresh_with(&app, &original).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().unwrap().contains("reuse"));

    let (_, status) = refresh_with(&app, &rotated).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    common::cleanup(app).await;
}

#[tokio::test]
async fn logout_revokes_refresh_token() {
    let app = common::spawn_app().await;
    let (login, _) = app.login(ROOT_EMAIL, PASSWORD).await;
    let refresh = login["refresh_token"].as_str().unwrap();

    let resp = app
        .client
        .post(app.url("/api/v1/auth/logout"))
        .json(&json!({ "refresh_token": refresh }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let (_, status) = refresh_with(&app, refresh).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    common::cleanup(app).await;
}

// ── Users ───────────────────────────────────────────────────────

#[tokio::test]
async fn users_list_is_scoped_by_tier() {
    let app = common::spawn_app().await;
    let rohan = app.create_company("Rohan").await;
    let gondor = app.create_company("Gondor").await;
    let (_, lord) = app.user_with_token("theoden", Some("lord"), Some(rohan)).await;
    app.create_user("eowyn", Some("dunedain"), Some(rohan)).await;
    app.create_user("faramir", Some("dunedain"), Some(gondor)).await;
    let (ranger_id, ranger) = app
        .user_with_token("hama", Some("dunedain"), Some(rohan))
        .await;
    let root = app.root_token().await;

    let (body, status) = app.get_auth("/api/v1/users", &root).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["total"], 5);

    let (body, _) = app.get_auth("/api/v1/users", &lord).await;
    assert_eq!(body["pagination"]["total"], 3);
    for user in body["users"].as_array().unwrap() {
        assert_eq!(user["company_id"], json!(rohan));
    }

    let (body, _) = app.get_auth("/api/v1/users", &ranger).await;
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["users"][0]["id"], json!(ranger_id));

    common::cleanup(app).await;
}

#[tokio::test]
async fn users_list_paginates_and_searches() {
    let app = common::spawn_app().await;
    for name in ["rider_one", "rider_two", "rider_three"] {
        app.create_user(name, Some("dunedain"), None).await;
    }
    let root = app.root_token().await;

    let (body, status) = app
        .get_auth("/api/v1/users?search=rider&per_page=2&page=2", &root)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["total"], 3);
    assert_eq!(body["pagination"]["pages"], 2);
    assert_eq!(body["pagination"]["has_prev"], true);
    assert_eq!(body["pagination"]["has_next"], false);
    assert_eq!(body["users"].as_array().unwrap().len(), 1);

    let (_, status) = app.get_auth("/api/v1/users?page=0", &root).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    common::cleanup(app).await;
}

#[tokio::test]
async fn users_list_clamps_page_size_and_rejects_unreachable_pages() {
    let app = common::spawn_app().await;
    let root = app.root_token().await;

    let (body, status) = app.get_auth("/api/v1/users?per_page=500", &root).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["per_page"], 100);

    let (body, status) = app
        .get_auth("/api/v1/users?page=9223372036854775807&per_page=100", &root)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["details"]["page"].is_array());

    common::cleanup(app).await;
}

#[tokio::test]
async fn lord_creates_user_in_own_company_with_default_role() {
    let app = common::spawn_app().await;
    let rohan = app.create_company("Rohan").await;
    let (_, lord) = app.user_with_token("theoden", Some("lord"), Some(rohan)).await;

    let (body, status) = app
        .post_auth(
            "/api/v1/users",
            &lord,
            &json!({ "email": "Gamling@Edoras.test", "username": "gamling", "password": PASSWORD }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["user"]["email"], "gamling@edoras.test");
    assert_eq!(body["user"]["company_id"], json!(rohan));
    assert_eq!(body["user"]["role_id"], json!(app.role_id("lord").await));

    common::cleanup(app).await;
}

#[tokio::test]
async fn lord_cannot_escalate_or_reach_other_companies() {
    let app = common::spawn_app().await;
    let rohan = app.create_company("Rohan").await;
    let gondor = app.create_company("Gondor").await;
    let (_, lord) = app.user_with_token("theoden", Some("lord"), Some(rohan)).await;
    let (outsider, _) = app.create_user("beregond", Some("dunedain"), Some(gondor)).await;
    let rohirrim = app.role_id("rohirrim").await;

    let (_, status) = app
        .post_auth(
            "/api/v1/users",
            &lord,
            &json!({
                "email": "wormtongue@edoras.test",
                "username": "wormtongue",
                "password": PASSWORD,
                "role_id": rohirrim,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, status) = app
        .post_auth(
            "/api/v1/users",
            &lord,
            &json!({
                "email": "spy@edoras.test",
                "username": "spy",
                "password": PASSWORD,
                "company_id": gondor,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, status) = app.get_auth(&format!("/api/v1/users/{outsider}"), &lord).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, status) = app
        .post_auth(
            &format!("/api/v1/users/{outsider}/assign-company-role"),
            &lord,
            &json!({ "company_id": rohan }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    common::cleanup(app).await;
}

#[tokio::test]
async fn create_user_validation_and_conflicts() {
    let app = common::spawn_app().await;
    let root = app.root_token().await;

    let (body, status) = app.post_auth("/api/v1/users", &root, &json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Validation failed");
    assert!(body["details"]["email"].is_array());
    assert!(body["details"]["username"].is_array());

    let (_, status) = app
        .post_auth(
            "/api/v1/users",
            &root,
            &json!({ "email": "a@edoras.test", "username": "aa1", "password": PASSWORD, "bogus": 1 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, status) = app
        .post_auth(
            "/api/v1/users",
            &root,
            &json!({ "email": ROOT_EMAIL, "username": "another", "password": PASSWORD }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    common::cleanup(app).await;
}

#[tokio::test]
async fn malformed_path_id_is_bad_request() {
    let app = common::spawn_app().await;
    let root = app.root_token().await;

    let (body, status) = app.get_auth("/api/v1/users/not-a-uuid", &root).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (_, status) = app
        .get_auth(&format!("/api/v1/users/{}", uuid::Uuid::nil()), &root)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    common::cleanup(app).await;
}

#[tokio::test]
async fn dunedain_may_only_edit_own_profile() {
    let app = common::spawn_app().await;
    let (me, token) = app.user_with_token("halbarad", Some("dunedain"), None).await;
    let (other, _) = app.create_user("elladan", Some("dunedain"), None).await;
    let lord_role = app.role_id("lord").await;

    let (body, status) = app
        .put_auth(
            &format!("/api/v1/users/{me}"),
            &token,
            &json!({ "first_name": "Halbarad", "last_name": "Dunadan" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["full_name"], "Halbarad Dunadan");

    let (_, status) = app
        .put_auth(&format!("/api/v1/users/{me}"), &token, &json!({ "role_id": lord_role }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, status) = app
        .put_auth(&format!("/api/v1/users/{other}"), &token, &json!({ "first_name": "X" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, status) = app.delete_auth(&format!("/api/v1/users/{other}"), &token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    common::cleanup(app).await;
}

#[tokio::test]
async fn self_deactivation_is_refused() {
    let app = common::spawn_app().await;
    let root = app.root_token().await;
    let (me, _) = app.get_auth("/api/v1/users/me", &root).await;
    let id = me["user"]["id"].as_str().unwrap().to_string();

    let (_, status) = app.delete_auth(&format!("/api/v1/users/{id}"), &root).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, status) = app
        .put_auth(&format!("/api/v1/users/{id}"), &root, &json!({ "is_active": false }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    common::cleanup(app).await;
}

#[tokio::test]
async fn delete_deactivates_and_activate_restores() {
    let app = common::spawn_app().await;
    let root = app.root_token().await;
    let (id, email) = app.create_user("gamling", Some("dunedain"), None).await;

    let (_, status) = app.delete_auth(&format!("/api/v1/users/{id}"), &root).await;
    assert_eq!(status, StatusCode::OK);

    let (body, _) = app.get_auth(&format!("/api/v1/users/{id}"), &root).await;
    assert_eq!(body["user"]["is_active"], false);

    let (_, status) = app.login(&email, PASSWORD).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (body, status) = app
        .post_auth(&format!("/api/v1/users/{id}/activate"), &root, &json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["is_active"], true);

    let (body, status) = app
        .post_auth(&format!("/api/v1/users/{id}/activate"), &root, &json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "User is already active");

    common::cleanup(app).await;
}

#[tokio::test]
async fn change_own_password() {
    let app = common::spawn_app().await;
    let (_, token) = app.user_with_token("erkenbrand", Some("dunedain"), None).await;

    let (body, status) = app
        .put_auth(
            "/api/v1/users/me/password",
            &token,
            &json!({ "current_password": "not-it-at-all", "new_password": "Helms-Deep-99" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["details"]["current_password"].is_array());

    let (body, status) = app
        .put_auth(
            "/api/v1/users/me/password",
            &token,
            &json!({ "current_password": PASSWORD, "new_password": "Helms-Deep-99" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["access_token"].is_string());

    let (_, status) = app.login("erkenbrand@edoras.test", PASSWORD).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (_, status) = app.login("erkenbrand@edoras.test", "Helms-Deep-99").await;
    assert_eq!(status, StatusCode::OK);

    common::cleanup(app).await;
}

#[tokio::test]
async fn lord_resets_password_within_company() {
    let app = common::spawn_app().await;
    let rohan = app.create_company("Rohan").await;
    let (_, lord) = app.user_with_token("theoden", Some("lord"), Some(rohan)).await;
    let (rider, email) = app.create_user("hama", Some("dunedain"), Some(rohan)).await;

    let (_, status) = app
        .post_auth(
            &format!("/api/v1/users/{rider}/reset-password"),
            &lord,
            &json!({ "new_password": "Golden-Hall-1" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, status) = app.login(&email, "Golden-Hall-1").await;
    assert_eq!(status, StatusCode::OK);

    common::cleanup(app).await;
}

#[tokio::test]
async fn lord_cannot_take_over_a_rohirrim_colleague() {
    let app = common::spawn_app().await;
    let rohan = app.create_company("Rohan").await;
    let (king, king_email) = app.create_user("theoden", Some("rohirrim"), Some(rohan)).await;
    let (_, lord) = app.user_with_token("grima", Some("lord"), Some(rohan)).await;

    let (_, status) = app
        .post_auth(
            &format!("/api/v1/users/{king}/reset-password"),
            &lord,
            &json!({ "new_password": "Wormtongue-1" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (_, status) = app.login(&king_email, "Wormtongue-1").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (_, status) = app.login(&king_email, common::PASSWORD).await;
    assert_eq!(status, StatusCode::OK);

    let (_, status) = app
        .put_auth(&format!("/api/v1/users/{king}"), &lord, &json!({ "first_name": "Old" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, status) = app.delete_auth(&format!("/api/v1/users/{king}"), &lord).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (body, status) = app.get_auth(&format!("/api/v1/users/{king}"), &lord).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["is_active"], true);

    common::cleanup(app).await;
}

#[tokio::test]
async fn rohirrim_assigns_company_and_default_role() {
    let app = common::spawn_app().await;
    let root = app.root_token().await;
    let rohan = app.create_company("Rohan").await;
    let (drifter, _) = app.create_user("ghan", None, None).await;

    let (body, status) = app
        .post_auth(
            &format!("/api/v1/users/{drifter}/assign-company-role"),
            &root,
            &json!({ "company_id": rohan }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["user"]["company_id"], json!(rohan));
    assert_eq!(body["user"]["role_id"], json!(app.role_id("lord").await));
    assert_eq!(body["user"]["access_level"], 2);

    common::cleanup(app).await;
}

// ── Companies ───────────────────────────────────────────────────

#[tokio::test]
async fn company_crud_by_rohirrim() {
    let app = common::spawn_app().await;
    let root = app.root_token().await;

    let (body, status) = app
        .post_auth(
            "/api/v1/companies",
            &root,
            &json!({ "name": "Edoras Tech", "vat_number": "IT12345678901", "city": "Edoras" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["company"]["country"], "IT");
    let id = body["company"]["id"].as_str().unwrap().to_string();

    let (body, status) = app
        .put_auth(
            &format!("/api/v1/companies/{id}"),
            &root,
            &json!({ "legal_name": "Edoras Technology S.R.L." }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["company"]["display_name"], "Edoras Technology S.R.L.");

    let (_, status) = app.delete_auth(&format!("/api/v1/companies/{id}"), &root).await;
    assert_eq!(status, StatusCode::OK);

    let (body, _) = app.get_auth("/api/v1/companies", &root).await;
    assert_eq!(body["pagination"]["total"], 0);
    let (body, _) = app.get_auth("/api/v1/companies?is_active=false", &root).await;
    assert_eq!(body["pagination"]["total"], 1);

    common::cleanup(app).await;
}

#[tokio::test]
async fn vat_number_is_unique_among_active_companies() {
    let app = common::spawn_app().await;
    let root = app.root_token().await;
    let company = json!({ "name": "Meduseld", "vat_number": "IT00000000001" });

    let (first, _) = app.post_auth("/api/v1/companies", &root, &company).await;
    let first_id = first["company"]["id"].as_str().unwrap().to_string();

    let (_, status) = app.post_auth("/api/v1/companies", &root, &company).await;
    assert_eq!(status, StatusCode::CONFLICT);

    app.delete_auth(&format!("/api/v1/companies/{first_id}"), &root).await;
    let (_, status) = app.post_auth("/api/v1/companies", &root, &company).await;
    assert_eq!(status, StatusCode::CREATED);

    // Reactivating the old one would duplicate the VAT number
    let (_, status) = app
        .post_auth(&format!("/api/v1/companies/{first_id}/activate"), &root, &json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    common::cleanup(app).await;
}

#[tokio::test]
async fn company_access_by_tier() {
    let app = common::spawn_app().await;
    let rohan = app.create_company("Rohan").await;
    let gondor = app.create_company("Gondor").await;
    let (_, lord) = app.user_with_token("theoden", Some("lord"), Some(rohan)).await;
    let (_, ranger) = app.user_with_token("hama", Some("dunedain"), Some(rohan)).await;

    let (body, status) = app.get_auth("/api/v1/companies", &lord).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["companies"][0]["id"], json!(rohan));

    let (_, status) = app.get_auth(&format!("/api/v1/companies/{rohan}"), &lord).await;
    assert_eq!(status, StatusCode::OK);
    let (_, status) = app.get_auth(&format!("/api/v1/companies/{gondor}"), &lord).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, status) = app
        .post_auth("/api/v1/companies", &lord, &json!({ "name": "Isengard" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, status) = app.get_auth("/api/v1/companies", &ranger).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    common::cleanup(app).await;
}

// ── Roles ───────────────────────────────────────────────────────

#[tokio::test]
async fn roles_are_rohirrim_only() {
    let app = common::spawn_app().await;
    let rohan = app.create_company("Rohan").await;
    let (_, lord) = app.user_with_token("theoden", Some("lord"), Some(rohan)).await;
    let root = app.root_token().await;

    let (_, status) = app.get_auth("/api/v1/roles", &lord).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (body, status) = app.get_auth("/api/v1/roles", &root).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["total"], 3);

    let (body, status) = app.get_auth("/api/v1/roles/stats", &root).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_roles"], 3);
    assert_eq!(body["default_role"]["name"], "lord");

    common::cleanup(app).await;
}

#[tokio::test]
async fn create_role_rejects_duplicates_and_second_default() {
    let app = common::spawn_app().await;
    let root = app.root_token().await;
    let steward = json!({ "name": "steward", "display_name": "Steward", "access_level": 4 });

    let (body, status) = app.post_auth("/api/v1/roles", &root, &steward).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["role"]["is_system"], false);

    let (_, status) = app.post_auth("/api/v1/roles", &root, &steward).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, status) = app
        .post_auth(
            "/api/v1/roles",
            &root,
            &json!({ "name": "marshal", "display_name": "Marshal", "access_level": 2, "is_default": true }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (body, status) = app
        .post_auth(
            "/api/v1/roles",
            &root,
            &json!({ "name": "Bad Name", "display_name": "B", "access_level": 11 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["details"]["name"].is_array());
    assert!(body["details"]["access_level"].is_array());

    common::cleanup(app).await;
}

#[tokio::test]
async fn system_roles_are_protected() {
    let app = common::spawn_app().await;
    let root = app.root_token().await;
    let rohirrim = app.role_id("rohirrim").await;

    let (_, status) = app.delete_auth(&format!("/api/v1/roles/{rohirrim}"), &root).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, status) = app
        .put_auth(&format!("/api/v1/roles/{rohirrim}"), &root, &json!({ "name": "wizard" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, status) = app
        .put_auth(&format!("/api/v1/roles/{rohirrim}"), &root, &json!({ "is_active": false }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (body, status) = app
        .put_auth(
            &format!("/api/v1/roles/{rohirrim}"),
            &root,
            &json!({ "display_name": "Riders of Rohan" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"]["display_name"], "Riders of Rohan");

    common::cleanup(app).await;
}

#[tokio::test]
async fn only_custom_roles_can_be_renamed_or_releveled() {
    let app = common::spawn_app().await;
    let root = app.root_token().await;

    for name in ["rohirrim", "lord", "dunedain"] {
        let id = app.role_id(name).await;
        for change in [json!({ "name": "wizard" }), json!({ "access_level": 7 })] {
            let (body, status) = app
                .put_auth(&format!("/api/v1/roles/{id}"), &root, &change)
                .await;
            assert_eq!(status, StatusCode::FORBIDDEN, "{name} {change} {body}");
        }
    }

    let (body, status) = app
        .post_auth(
            "/api/v1/roles",
            &root,
            &json!({ "name": "herald", "display_name": "Herald", "access_level": 4 }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let herald = body["role"]["id"].as_str().unwrap().to_string();

    let (body, status) = app
        .put_auth(&format!("/api/v1/roles/{herald}"), &root, &json!({ "name": "messenger" }))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["role"]["name"], "messenger");

    let (body, status) = app
        .put_auth(&format!("/api/v1/roles/{herald}"), &root, &json!({ "access_level": 6 }))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["role"]["access_level"], 6);

    common::cleanup(app).await;
}

#[tokio::test]
async fn role_with_active_users_cannot_be_removed() {
    let app = common::spawn_app().await;
    let root = app.root_token().await;

    let (body, _) = app
        .post_auth(
            "/api/v1/roles",
            &root,
            &json!({ "name": "marshal", "display_name": "Marshal", "access_level": 2 }),
        )
        .await;
    let marshal = body["role"]["id"].as_str().unwrap().to_string();
    app.create_user("erkenbrand", Some("marshal"), None).await;

    let (_, status) = app.delete_auth(&format!("/api/v1/roles/{marshal}"), &root).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, status) = app
        .put_auth(&format!("/api/v1/roles/{marshal}"), &root, &json!({ "is_active": false }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    common::cleanup(app).await;
}

#[tokio::test]
async fn assign_permissions_moves_them_to_role() {
    let app = common::spawn_app().await;
    let root = app.root_token().await;
    let lord = app.role_id("lord").await;

    let (body, _) = app
        .post_auth(
            "/api/v1/roles",
            &root,
            &json!({ "name": "auditor", "display_name": "Auditor", "access_level": 5 }),
        )
        .await;
    let auditor = body["role"]["id"].as_str().unwrap().to_string();

    let (body, _) = app
        .post_auth(
            "/api/v1/permissions",
            &root,
            &json!({ "name": "report.export", "display_name": "Export reports", "category": "report", "role_id": lord }),
        )
        .await;
    let permission = body["permission"]["id"].as_str().unwrap().to_string();

    let (body, status) = app
        .post_auth(
            &format!("/api/v1/roles/{auditor}/assign-permissions"),
            &root,
            &json!({ "permission_ids": [permission] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["permissions_assigned"], 1);

    let (body, _) = app
        .get_auth(&format!("/api/v1/permissions/{permission}"), &root)
        .await;
    assert_eq!(body["permission"]["role_id"], json!(auditor));

    // System permissions stay with their role
    let system_admin: uuid::Uuid =
        sqlx::query_scalar("SELECT id FROM permissions WHERE name = 'system.admin'")
            .fetch_one(&app.pool)
            .await
            .unwrap();
    let (_, status) = app
        .post_auth(
            &format!("/api/v1/roles/{auditor}/assign-permissions"),
            &root,
            &json!({ "permission_ids": [system_admin] }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, status) = app
        .post_auth(
            &format!("/api/v1/roles/{auditor}/assign-permissions"),
            &root,
            &json!({ "permission_ids": [uuid::Uuid::nil()] }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    common::cleanup(app).await;
}

// ── Permissions ─────────────────────────────────────────────────

#[tokio::test]
async fn permission_catalogue_is_seeded() {
    let app = common::spawn_app().await;
    let root = app.root_token().await;

    let (body, status) = app.get_auth("/api/v1/permissions/categories", &root).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_categories"], 9);

    let (body, status) = app
        .get_auth("/api/v1/permissions?category=system&include_role_info=true", &root)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["total"], 4);
    assert_eq!(body["permissions"][0]["role_info"]["name"], "rohirrim");

    let (_, status) = app.get_auth("/api/v1/permissions?category=dragons", &root).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (body, status) = app.get_auth("/api/v1/permissions/stats", &root).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_permissions"], 57);

    common::cleanup(app).await;
}

#[tokio::test]
async fn create_permission_checks_role_and_duplicates() {
    let app = common::spawn_app().await;
    let root = app.root_token().await;
    let lord = app.role_id("lord").await;

    let (body, status) = app
        .post_auth(
            "/api/v1/permissions",
            &root,
            &json!({ "name": "report.view", "display_name": "View reports", "category": "report", "role_id": uuid::Uuid::nil() }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["details"]["role_id"].is_array());

    let (_, status) = app
        .post_auth(
            "/api/v1/permissions",
            &root,
            &json!({ "name": "company.read.own", "display_name": "Duplicate", "category": "company", "role_id": lord }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    common::cleanup(app).await;
}

#[tokio::test]
async fn permissions_cannot_target_an_inactive_role() {
    let app = common::spawn_app().await;
    let root = app.root_token().await;

    let (body, status) = app
        .post_auth(
            "/api/v1/roles",
            &root,
            &json!({ "name": "scribe", "display_name": "Scribe", "access_level": 5 }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let scribe = body["role"]["id"].as_str().unwrap().to_string();
    let (_, status) = app.delete_auth(&format!("/api/v1/roles/{scribe}"), &root).await;
    assert_eq!(status, StatusCode::OK);

    let entry = json!({ "name": "archive.read", "display_name": "Read archive", "category": "report", "role_id": scribe });
    let (body, status) = app.post_auth("/api/v1/permissions", &root, &entry).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["details"]["role_id"].is_array());

    let (body, status) = app
        .post_auth("/api/v1/permissions/bulk", &root, &json!({ "permissions": [entry] }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["error"], "Role not found or inactive");

    common::cleanup(app).await;
}

#[tokio::test]
async fn system_permissions_are_protected() {
    let app = common::spawn_app().await;
    let root = app.root_token().await;
    let id: uuid::Uuid =
        sqlx::query_scalar("SELECT id FROM permissions WHERE name = 'system.debug'")
            .fetch_one(&app.pool)
            .await
            .unwrap();

    let (_, status) = app.delete_auth(&format!("/api/v1/permissions/{id}"), &root).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, status) = app
        .put_auth(&format!("/api/v1/permissions/{id}"), &root, &json!({ "category": "other" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (body, status) = app
        .put_auth(
            &format!("/api/v1/permissions/{id}"),
            &root,
            &json!({ "display_name": "Debug tooling" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["permission"]["display_name"], "Debug tooling");

    common::cleanup(app).await;
}

#[tokio::test]
async fn permission_soft_delete_and_activate() {
    let app = common::spawn_app().await;
    let root = app.root_token().await;
    let id: uuid::Uuid = sqlx::query_scalar(
        "SELECT p.id FROM permissions p JOIN roles r ON r.id = p.role_id
         WHERE r.name = 'lord' AND p.name = 'pod.create'",
    )
    .fetch_one(&app.pool)
    .await
    .unwrap();

    let (body, status) = app.delete_auth(&format!("/api/v1/permissions/{id}"), &root).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["permission_name"], "pod.create");

    let (body, _) = app.get_auth(&format!("/api/v1/permissions/{id}"), &root).await;
    assert_eq!(body["permission"]["is_active"], false);
    assert!(body["permission"]["deleted_at"].is_string());

    let (body, status) = app
        .post_auth(&format!("/api/v1/permissions/{id}/activate"), &root, &json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["permission"]["is_active"], true);
    assert!(body["permission"]["deleted_at"].is_null());

    common::cleanup(app).await;
}

#[tokio::test]
async fn bulk_create_reports_partial_success() {
    let app = common::spawn_app().await;
    let root = app.root_token().await;
    let lord = app.role_id("lord").await;

    let (body, status) = app
        .post_auth(
            "/api/v1/permissions/bulk",
            &root,
            &json!({ "permissions": [
                { "name": "report.view", "display_name": "View reports", "category": "report", "role_id": lord },
                { "name": "Not Valid", "display_name": "Broken", "category": "report", "role_id": lord },
                { "name": "company.read.own", "display_name": "Duplicate", "category": "company", "role_id": lord },
            ]}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["summary"]["created"], 1);
    assert_eq!(body["summary"]["failed"], 2);
    assert_eq!(body["errors"][0]["index"], 1);
    assert_eq!(body["errors"][1]["name"], "company.read.own");

    let (body, status) = app
        .post_auth(
            "/api/v1/permissions/bulk",
            &root,
            &json!({ "permissions": [
                { "name": "x", "display_name": "Too short", "category": "report", "role_id": lord },
            ]}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No permissions created");

    let too_many: Vec<Value> = (0..51)
        .map(|i| json!({ "name": format!("report.p{i}"), "display_name": "Report", "category": "report", "role_id": lord }))
        .collect();
    let (_, status) = app
        .post_auth("/api/v1/permissions/bulk", &root, &json!({ "permissions": too_many }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    common::cleanup(app).await;
}

#[tokio::test]
async fn bulk_update_skips_protected_permissions() {
    let app = common::spawn_app().await;
    let root = app.root_token().await;
    let ids: Vec<uuid::Uuid> = sqlx::query_scalar(
        "SELECT id FROM permissions WHERE name IN ('system.logs', 'pod.read.all') ORDER BY name",
    )
    .fetch_all(&app.pool)
    .await
    .unwrap();

    let (body, status) = app
        .put_auth(
            "/api/v1/permissions/bulk",
            &root,
            &json!({ "permission_ids": ids, "updates": { "category": "other" } }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["summary"]["updated"], 1);
    assert_eq!(body["protected_permissions_skipped"], 1);
    assert_eq!(body["updated_permissions"][0]["name"], "pod.read.all");

    let (_, status) = app
        .put_auth(
            "/api/v1/permissions/bulk",
            &root,
            &json!({ "permission_ids": [uuid::Uuid::nil()], "updates": { "is_active": false } }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    common::cleanup(app).await;
}

#[tokio::test]
async fn permissions_are_rohirrim_only() {
    let app = common::spawn_app().await;
    let rohan = app.create_company("Rohan").await;
    let (_, lord) = app.user_with_token("theoden", Some("lord"), Some(rohan)).await;

    let (_, status) = app.get_auth("/api/v1/permissions", &lord).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (_, status) = app.get_auth("/api/v1/permissions/stats", &lord).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    common::cleanup(app).await;
}

// ── Audit ───────────────────────────────────────────────────────

#[tokio::test]
async fn audit_events_record_mutations() {
    let app = common::spawn_app().await;
    let root = app.root_token().await;
    let (body, _) = app
        .post_auth("/api/v1/companies", &root, &json!({ "name": "Dunharrow" }))
        .await;
    let company = body["company"]["id"].clone();

    let (body, status) = app
        .get_auth("/api/v1/audit-events?resource_type=company", &root)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["events"][0]["action"], "company.created");
    assert_eq!(body["events"][0]["resource_id"], company);

    let rohan = app.create_company("Rohan").await;
    let (_, lord) = app.user_with_token("theoden", Some("lord"), Some(rohan)).await;
    let (_, status) = app.get_auth("/api/v1/audit-events", &lord).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    common::cleanup(app).await;
}
