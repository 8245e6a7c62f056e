//! Field workflows: logging and validating hours, photo reports and the
//! anomaly lifecycle, plus the chantier report that aggregates them

mod helpers;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use chantiers_common::domain::RoleMembre;
use chantiers_common::time;
use helpers::{extract_json, TestApp};
use serde_json::{json, Value};
use tower::ServiceExt;

/// Smallest byte prefix recognised as a PNG image
const PNG_BYTES: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x02, 0x00, 0x00, 0x00,
];

const BOUNDARY: &str = "chantiers-test-boundary";

fn money(value: &Value) -> f64 {
    value.as_str().unwrap().parse().unwrap()
}

/// Chantier → lot → one tâche, created by staff
async fn planned_tache(app: &TestApp, token: &str) -> (i64, i64) {
    let chantier = app.chantier(token, "CH-100", "2024-01-01", "2099-12-31").await;
    let lot = app.lot(token, chantier, 1).await;
    let tache = app.tache(token, lot, "T1", "EN_COURS", "2099-01-01").await;
    (chantier, tache)
}

fn multipart_body(file_name: &str, bytes: &[u8], titre: &str) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"titre\"\r\n\r\n{t}\r\n",
            b = BOUNDARY,
            t = titre
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"latitude\"\r\n\r\n45.76\r\n",
            b = BOUNDARY
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{f}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
            b = BOUNDARY,
            f = file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

async fn upload(app: &TestApp, token: &str, tache: i64, file_name: &str, bytes: &[u8]) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri(format!("/api/v1/taches/{}/photo", tache))
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(file_name, bytes, "Dalle coulée")))
        .unwrap();

    let response = app.app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    (status, extract_json(response).await)
}

#[tokio::test]
async fn test_logging_hours_on_a_tache() {
    let app = TestApp::new().await;
    let admin = app.staff().await;
    let (_, tache) = planned_tache(&app, &admin.token).await;

    let mut membre = 0;
    for i in 1..=5 {
        membre = app.membre(&format!("ouvrier{}", i), RoleMembre::Ouvrier, None).await;
    }
    assert_eq!(membre, 5);

    let (status, body) = app
        .post(
            &format!("/api/v1/taches/{}/heures", tache),
            &admin.token,
            json!({ "heures": 8.5, "membre": 5 }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert!(body["id"].as_i64().is_some());
    assert_eq!(body["heures"].as_f64(), Some(8.5));
    assert_eq!(body["membre"], 5);
    assert_eq!(body["tache"], tache);
    assert_eq!(body["validee"], false);
    assert_eq!(body["date"], time::today().to_string());

    let (_, before) = app.get(&format!("/api/v1/taches/{}", tache), &admin.token).await;
    assert_eq!(before["heures_reelles"].as_f64(), Some(8.5));
    assert_eq!(money(&before["cout_reel"]), 0.0);

    app.post(&format!("/api/v1/heures_travail/{}/valider", body["id"]), &admin.token, json!({}))
        .await;
    let (_, after) = app.get(&format!("/api/v1/taches/{}", tache), &admin.token).await;
    assert_eq!(money(&after["cout_reel"]), 425.0);
}

#[tokio::test]
async fn test_hours_out_of_range_are_rejected() {
    let app = TestApp::new().await;
    let admin = app.staff().await;
    let (_, tache) = planned_tache(&app, &admin.token).await;
    let membre = app.membre("jean", RoleMembre::Ouvrier, None).await;
    let uri = format!("/api/v1/taches/{}/heures", tache);

    for heures in [0.0, -1.0, 24.5] {
        let (status, body) = app
            .post(&uri, &admin.token, json!({ "heures": heures, "membre": membre }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "accepted {}", heures);
        assert!(body["error"]["fields"]["heures"].is_array());
    }
}

#[tokio::test]
async fn test_hours_default_to_callers_membre() {
    let app = TestApp::new().await;
    let admin = app.staff().await;
    let ouvrier = app.user("paul", false, Some(RoleMembre::Ouvrier)).await;
    let (_, tache) = planned_tache(&app, &admin.token).await;

    let (status, body) = app
        .post("/api/v1/heures_travail", &ouvrier.token, json!({ "tache": tache, "heures": 7 }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["membre"], ouvrier.membre_id.unwrap());

    let (status, _) = app
        .post("/api/v1/heures_travail", &admin.token, json!({ "tache": tache, "heures": 7 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_only_managers_log_hours_for_someone_else() {
    let app = TestApp::new().await;
    let admin = app.staff().await;
    let chef = app.user("marie", false, Some(RoleMembre::Chef)).await;
    let paul = app.user("paul", false, Some(RoleMembre::Ouvrier)).await;
    let jean = app.user("jean", false, Some(RoleMembre::Ouvrier)).await;
    let (_, tache) = planned_tache(&app, &admin.token).await;
    let uri = format!("/api/v1/taches/{}/heures", tache);
    let jean_id = jean.membre_id.unwrap();

    let (status, _) = app
        .post(&uri, &paul.token, json!({ "heures": 4, "membre": jean_id }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .post(&uri, &paul.token, json!({ "heures": 4, "membre": paul.membre_id.unwrap() }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);

    for token in [&chef.token, &admin.token] {
        let (status, body) = app
            .post(&uri, token, json!({ "heures": 2, "membre": jean_id }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        assert_eq!(body["membre"], jean_id);
    }
}

#[tokio::test]
async fn test_validating_hours_twice_conflicts() {
    let app = TestApp::new().await;
    let admin = app.staff().await;
    let ouvrier = app.user("paul", false, Some(RoleMembre::Ouvrier)).await;
    let (_, tache) = planned_tache(&app, &admin.token).await;

    let (_, entry) = app
        .post(
            &format!("/api/v1/taches/{}/heures", tache),
            &ouvrier.token,
            json!({ "heures": 4 }),
        )
        .await;
    let uri = format!("/api/v1/heures_travail/{}/valider", entry["id"]);

    let (status, _) = app.post(&uri, &ouvrier.token, json!({})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.post(&uri, &admin.token, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["validee"], true);
    assert_eq!(body["validee_par"], admin.user_id);

    let (status, body) = app.post(&uri, &admin.token, json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn test_chantier_chef_validates_hours_on_own_site() {
    let app = TestApp::new().await;
    let chef = app.user("marie", false, Some(RoleMembre::Chef)).await;
    let ouvrier = app.user("paul", false, Some(RoleMembre::Ouvrier)).await;
    let (_, tache) = planned_tache(&app, &chef.token).await;

    let (_, entry) = app
        .post(
            &format!("/api/v1/taches/{}/heures", tache),
            &ouvrier.token,
            json!({ "heures": 6 }),
        )
        .await;

    let (status, body) = app
        .post(&format!("/api/v1/heures_travail/{}/valider", entry["id"]), &chef.token, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["validee"], true);
}

#[tokio::test]
async fn test_mes_heures_sums_current_month() {
    let app = TestApp::new().await;
    let admin = app.staff().await;
    let ouvrier = app.user("paul", false, Some(RoleMembre::Ouvrier)).await;
    let (_, tache) = planned_tache(&app, &admin.token).await;
    let uri = format!("/api/v1/taches/{}/heures", tache);

    app.post(&uri, &ouvrier.token, json!({ "heures": 8.5 })).await;
    app.post(&uri, &ouvrier.token, json!({ "heures": 1.5 })).await;
    app.post(&uri, &ouvrier.token, json!({ "heures": 3, "date": "2001-02-03" })).await;

    let (status, body) = app.get("/api/v1/heures_travail/mes_heures", &ouvrier.token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_heures"].as_f64(), Some(10.0));
    assert_eq!(body["heures"].as_array().map(Vec::len), Some(2));
    assert_eq!(body["mois"], time::today().format("%Y-%m").to_string());

    let (status, _) = app.get("/api/v1/heures_travail/mes_heures", &admin.token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, membre) = app
        .get(&format!("/api/v1/membres/{}", ouvrier.membre_id.unwrap()), &admin.token)
        .await;
    assert_eq!(membre["heures_ce_mois"].as_f64(), Some(10.0));
}

#[tokio::test]
async fn test_heures_list_filters() {
    let app = TestApp::new().await;
    let admin = app.staff().await;
    let ouvrier = app.user("paul", false, Some(RoleMembre::Ouvrier)).await;
    let (_, tache) = planned_tache(&app, &admin.token).await;
    let uri = format!("/api/v1/taches/{}/heures", tache);

    let (_, first) = app.post(&uri, &ouvrier.token, json!({ "heures": 2 })).await;
    app.post(&uri, &ouvrier.token, json!({ "heures": 3 })).await;
    app.post(
        &format!("/api/v1/heures_travail/{}/valider", first["id"]),
        &admin.token,
        json!({}),
    )
    .await;

    let (_, body) = app.get("/api/v1/heures_travail?validee=true", &admin.token).await;
    assert_eq!(body["count"], 1);
    let (_, body) = app
        .get(&format!("/api/v1/heures_travail?tache={}&validee=false", tache), &admin.token)
        .await;
    assert_eq!(body["count"], 1);

    let (_, body) = app.get(&uri, &admin.token).await;
    assert_eq!(body.as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn test_photo_upload_and_approval() {
    let app = TestApp::new().await;
    let chef = app.user("marie", false, Some(RoleMembre::Chef)).await;
    let ouvrier = app.user("paul", false, Some(RoleMembre::Ouvrier)).await;
    let (_, tache) = planned_tache(&app, &chef.token).await;

    let (status, photo) = upload(&app, &ouvrier.token, tache, "dalle.PNG", PNG_BYTES).await;
    assert_eq!(status, StatusCode::CREATED, "{}", photo);
    assert_eq!(photo["titre"], "Dalle coulée");
    assert_eq!(photo["approuvee"], false);
    assert_eq!(photo["latitude"].as_f64(), Some(45.76));
    let image_url = photo["image_url"].as_str().unwrap();
    assert!(image_url.starts_with("/media/chantiers/photos/"));
    assert!(image_url.ends_with(".png"));

    let stored = app.state.photos.media_root().join(photo["image"].as_str().unwrap());
    assert_eq!(std::fs::read(stored).unwrap(), PNG_BYTES);

    let (_, photos) = app.get(&format!("/api/v1/taches/{}/photos", tache), &chef.token).await;
    assert_eq!(photos.as_array().map(Vec::len), Some(1));

    let approve = format!("/api/v1/photos/{}/approuver", photo["id"]);
    let (status, _) = app.post(&approve, &ouvrier.token, json!({})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = app.post(&approve, &chef.token, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["approuvee"], true);
    let (status, _) = app.post(&approve, &chef.token, json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_photo_upload_rejects_non_images() {
    let app = TestApp::new().await;
    let admin = app.staff().await;
    let (_, tache) = planned_tache(&app, &admin.token).await;

    let (status, body) = upload(&app, &admin.token, tache, "notes.txt", b"hello").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["fields"]["image"].is_array());

    let (status, body) = upload(&app, &admin.token, tache, "fake.png", b"not really a png").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["fields"]["image"].is_array());

    let (_, photos) = app.get(&format!("/api/v1/taches/{}/photos", tache), &admin.token).await;
    assert_eq!(photos.as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn test_anomalie_lifecycle() {
    let app = TestApp::new().await;
    let admin = app.staff().await;
    let ouvrier = app.user("paul", false, Some(RoleMembre::Ouvrier)).await;
    let responsable = app.membre("resp", RoleMembre::ChefEquipe, None).await;
    let (chantier, tache) = planned_tache(&app, &admin.token).await;

    let (status, anomalie) = app
        .post(
            &format!("/api/v1/taches/{}/signaler_anomalie", tache),
            &ouvrier.token,
            json!({ "titre": "Fissure", "description": "Mur nord", "severite": "MAJEURE" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", anomalie);
    assert_eq!(anomalie["statut"], "OUVERTE");
    assert_eq!(anomalie["signalee_par"], ouvrier.user_id);
    let id = anomalie["id"].as_i64().unwrap();

    let close = format!("/api/v1/anomalies/{}/fermer", id);
    let assign = format!("/api/v1/anomalies/{}/assigner", id);

    let (status, _) = app.post(&close, &admin.token, json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app.post(&assign, &ouvrier.token, json!({ "responsable_id": responsable })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.post(&assign, &admin.token, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app.post(&assign, &admin.token, json!({ "responsable_id": responsable })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["statut"], "ASSIGNEE");
    assert_eq!(body["responsable"], responsable);

    let (_, open) = app
        .get(&format!("/api/v1/chantiers/{}/anomalies?statut=ASSIGNEE", chantier), &admin.token)
        .await;
    assert_eq!(open.as_array().map(Vec::len), Some(1));

    let (status, body) = app.post(&close, &admin.token, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["statut"], "FERMEE");
    assert_eq!(body["date_resolution_reelle"], time::today().to_string());

    let (status, _) = app.post(&assign, &admin.token, json!({ "responsable_id": responsable })).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_anomalie_requires_fields() {
    let app = TestApp::new().await;
    let admin = app.staff().await;
    let (_, tache) = planned_tache(&app, &admin.token).await;

    let (status, body) = app
        .post(&format!("/api/v1/taches/{}/signaler_anomalie", tache), &admin.token, json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let fields = &body["error"]["fields"];
    for field in ["titre", "description", "severite"] {
        assert!(fields[field].is_array(), "no error for {}", field);
    }
}

#[tokio::test]
async fn test_chantier_rapport() {
    let app = TestApp::new().await;
    let admin = app.staff().await;
    let ouvrier = app.user("paul", false, Some(RoleMembre::Ouvrier)).await;
    let chantier = app.chantier(&admin.token, "CH-200", "2024-01-01", "2099-12-31").await;
    let lot = app.lot(&admin.token, chantier, 1).await;
    let done = app.tache(&admin.token, lot, "T1", "TERMINEE", "2099-01-01").await;
    app.tache(&admin.token, lot, "T2", "A_FAIRE", "2099-01-01").await;

    app.post(&format!("/api/v1/taches/{}/heures", done), &ouvrier.token, json!({ "heures": 2 }))
        .await;
    app.post(
        &format!("/api/v1/taches/{}/signaler_anomalie", done),
        &ouvrier.token,
        json!({ "titre": "Fuite", "description": "Raccord", "severite": "MINEURE" }),
    )
    .await;

    let (status, rapport) = app
        .get(&format!("/api/v1/chantiers/{}/rapport", chantier), &admin.token)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rapport["chantier"]["id"], chantier);
    assert_eq!(rapport["lots"].as_array().map(Vec::len), Some(1));
    assert_eq!(rapport["taches_totales"], 2);
    assert_eq!(rapport["taches_terminees"], 1);
    assert_eq!(rapport["progression_percentage"].as_f64(), Some(50.0));
    assert_eq!(rapport["heures_estimees"].as_f64(), Some(20.0));
    assert_eq!(rapport["heures_reelles"].as_f64(), Some(2.0));
    assert_eq!(rapport["cout_previsionnel"], "150000.00");
    assert_eq!(rapport["anomalies_ouvertes"], 1);
    assert_eq!(rapport["membres_actifs"], 0);
}

#[tokio::test]
async fn test_deleting_chantier_cascades() {
    let app = TestApp::new().await;
    let admin = app.staff().await;
    let (chantier, tache) = planned_tache(&app, &admin.token).await;

    let (status, _) = app.delete(&format!("/api/v1/chantiers/{}", chantier), &admin.token).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.get(&format!("/api/v1/taches/{}", tache), &admin.token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
