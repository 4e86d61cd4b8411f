mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{TestApp, git_available};

// sha256("123")
const OID_123: &str = "a665a45920422f9d417e4867efdc4fb8a04a1f3fff1fa07e998e86f7f7a27ae3";
// sha256("A")
const OID_A: &str = "559aead08264d5795d3909718cdd05abd49572e84fe55590eef31a88a08fdffd";

#[tokio::test]
async fn health_is_open() {
    let app = TestApp::new();
    let (status, body) = app.raw_request("GET", "/health", None, &[], Vec::new()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");
}

#[tokio::test]
async fn admin_endpoints_reject_anonymous_and_user_tokens() {
    let app = TestApp::new();

    let (status, _) = app
        .json_request("GET", "/api/v1/admin/namespaces", None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_user_id, _ns_id, user_token) = app.create_user_with_token("alice").await;
    let (status, _) = app
        .json_request("GET", "/api/v1/admin/namespaces", Some(&user_token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn namespace_crud_and_name_conflicts() {
    let app = TestApp::new();

    let (status, body) = app
        .json_request(
            "POST",
            "/api/v1/admin/namespaces",
            Some(&app.admin_token),
            Some(json!({ "name": "Acme" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    // Lowercased on write.
    assert_eq!(body["data"]["name"], "acme");

    let (status, _) = app
        .json_request(
            "POST",
            "/api/v1/admin/namespaces",
            Some(&app.admin_token),
            Some(json!({ "name": "acme" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .json_request(
            "POST",
            "/api/v1/admin/namespaces",
            Some(&app.admin_token),
            Some(json!({ "name": "../evil" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .json_request(
            "GET",
            "/api/v1/admin/namespaces/acme",
            Some(&app.admin_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "acme");
}

#[tokio::test]
async fn primary_namespace_cannot_be_granted_to_others() {
    let app = TestApp::new();

    let (_u1, ns1, _t1) = app.create_user_with_token("owner").await;
    let (u2, _ns2, _t2) = app.create_user_with_token("intruder").await;

    let (status, body) = app
        .json_request(
            "POST",
            &format!("/api/v1/admin/users/{u2}/namespace-grants"),
            Some(&app.admin_token),
            Some(json!({ "namespace_id": ns1, "allow": ["namespace:read"] })),
        )
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");
}

#[tokio::test]
async fn user_repo_lifecycle_with_disk() {
    if !git_available() {
        eprintln!("skipping: git not found in PATH");
        return;
    }

    let app = TestApp::new();
    let (_user_id, ns_id, token) = app.create_user_with_token("alice").await;

    let repo_id = app.create_repo(&token, "Widgets", false).await;

    // Name lowercased, bare repo on disk.
    assert!(app.repo_dir(&ns_id, "widgets").exists());

    let (status, body) = app
        .json_request("GET", &format!("/api/v1/repos/{repo_id}"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "widgets");

    // Rename moves the directory and the row together.
    let (status, body) = app
        .json_request(
            "PATCH",
            &format!("/api/v1/repos/{repo_id}"),
            Some(&token),
            Some(json!({ "name": "gadgets" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(app.repo_dir(&ns_id, "gadgets").exists());
    assert!(!app.repo_dir(&ns_id, "widgets").exists());

    // Delete removes both.
    let (status, _) = app
        .json_request("DELETE", &format!("/api/v1/repos/{repo_id}"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(!app.repo_dir(&ns_id, "gadgets").exists());
}

#[tokio::test]
async fn rename_collision_leaves_both_repos_untouched() {
    if !git_available() {
        eprintln!("skipping: git not found in PATH");
        return;
    }

    let app = TestApp::new();
    let (_user_id, ns_id, token) = app.create_user_with_token("alice").await;

    let _alpha = app.create_repo(&token, "alpha", false).await;
    let beta = app.create_repo(&token, "beta", false).await;

    let (status, _) = app
        .json_request(
            "PATCH",
            &format!("/api/v1/repos/{beta}"),
            Some(&token),
            Some(json!({ "name": "alpha" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    assert!(app.repo_dir(&ns_id, "alpha").exists());
    assert!(app.repo_dir(&ns_id, "beta").exists());

    let (status, body) = app
        .json_request("GET", &format!("/api/v1/repos/{beta}"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "beta");
}

#[tokio::test]
async fn admin_token_cannot_touch_repo_content() {
    if !git_available() {
        eprintln!("skipping: git not found in PATH");
        return;
    }

    let app = TestApp::new();
    let (_user_id, _ns_id, token) = app.create_user_with_token("alice").await;
    let repo_id = app.create_repo(&token, "app", false).await;

    let (status, body) = app
        .json_request(
            "GET",
            &format!("/api/v1/repos/{repo_id}/refs"),
            Some(&app.admin_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        body["error"],
        "Admin token cannot be used for this operation"
    );
}

#[tokio::test]
async fn anonymous_info_refs_on_public_repo() {
    if !git_available() {
        eprintln!("skipping: git not found in PATH");
        return;
    }

    let app = TestApp::new();
    let (_user_id, _ns_id, token) = app.create_user_with_token("acme").await;
    let _repo_id = app.create_repo(&token, "app", true).await;

    let (status, body) = app
        .raw_request(
            "GET",
            "/git/acme/app.git/info/refs?service=git-upload-pack",
            None,
            &[],
            Vec::new(),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert!(
        body.starts_with(b"001e# service=git-upload-pack\n0000"),
        "unexpected advertisement prefix: {:?}",
        &body[..body.len().min(40)]
    );
}

#[tokio::test]
async fn private_repo_requires_auth_and_permission() {
    if !git_available() {
        eprintln!("skipping: git not found in PATH");
        return;
    }

    let app = TestApp::new();
    let (_u1, _ns1, owner_token) = app.create_user_with_token("acme").await;
    let repo_id = app.create_repo(&owner_token, "app", false).await;

    // Anonymous read: 401 with a challenge.
    let (status, _) = app
        .raw_request(
            "GET",
            "/git/acme/app.git/info/refs?service=git-upload-pack",
            None,
            &[],
            Vec::new(),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // A user holding only repo:read cannot push.
    let (u2, _ns2, reader_token) = app.create_user_with_token("reader").await;
    let (status, _) = app
        .json_request(
            "POST",
            &format!("/api/v1/admin/users/{u2}/repo-grants"),
            Some(&app.admin_token),
            Some(json!({ "repo_id": repo_id, "allow": ["repo:read"] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .raw_request(
            "POST",
            "/git/acme/app.git/git-receive-pack",
            Some(&reader_token),
            &[],
            Vec::new(),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // But the same token can read.
    let (status, _) = app
        .raw_request(
            "GET",
            "/git/acme/app.git/info/refs?service=git-upload-pack",
            Some(&reader_token),
            &[],
            Vec::new(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn lfs_upload_verify_download_roundtrip() {
    if !git_available() {
        eprintln!("skipping: git not found in PATH");
        return;
    }

    let app = TestApp::new();
    let (_user_id, _ns_id, token) = app.create_user_with_token("acme").await;
    let _repo_id = app.create_repo(&token, "app", false).await;

    let base = "/git/acme/app.git/info/lfs";

    // Batch upload negotiation offers upload + verify actions.
    let batch = json!({
        "operation": "upload",
        "objects": [{ "oid": OID_123, "size": 3 }],
    });
    let (status, body) = app
        .raw_request(
            "POST",
            &format!("{base}/objects/batch"),
            Some(&token),
            &[("content-type", "application/vnd.git-lfs+json")],
            serde_json::to_vec(&batch).unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(parsed["objects"][0]["actions"]["upload"]["href"].is_string());
    assert!(parsed["objects"][0]["actions"]["verify"]["href"].is_string());

    // Upload.
    let (status, _) = app
        .raw_request(
            "PUT",
            &format!("{base}/objects/{OID_123}"),
            Some(&token),
            &[("content-length", "3")],
            b"123".to_vec(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // Verify: exact size passes, wrong size is a 400, unknown OID a 404.
    let (status, _) = app
        .raw_request(
            "POST",
            &format!("{base}/verify"),
            Some(&token),
            &[("content-type", "application/vnd.git-lfs+json")],
            serde_json::to_vec(&json!({ "oid": OID_123, "size": 3 })).unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .raw_request(
            "POST",
            &format!("{base}/verify"),
            Some(&token),
            &[("content-type", "application/vnd.git-lfs+json")],
            serde_json::to_vec(&json!({ "oid": OID_123, "size": 4 })).unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .raw_request(
            "POST",
            &format!("{base}/verify"),
            Some(&token),
            &[("content-type", "application/vnd.git-lfs+json")],
            serde_json::to_vec(&json!({ "oid": OID_A, "size": 1 })).unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Download returns the exact bytes.
    let (status, body) = app
        .raw_request(
            "GET",
            &format!("{base}/objects/{OID_123}"),
            Some(&token),
            &[],
            Vec::new(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"123");

    // A second batch upload reports the object as already present.
    let (status, body) = app
        .raw_request(
            "POST",
            &format!("{base}/objects/batch"),
            Some(&token),
            &[("content-type", "application/vnd.git-lfs+json")],
            serde_json::to_vec(&batch).unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(parsed["objects"][0]["actions"].is_null());
    assert!(parsed["objects"][0]["error"].is_null());
}

#[tokio::test]
async fn lfs_hash_mismatch_leaves_no_trace() {
    if !git_available() {
        eprintln!("skipping: git not found in PATH");
        return;
    }

    let app = TestApp::new();
    let (_user_id, _ns_id, token) = app.create_user_with_token("acme").await;
    let _repo_id = app.create_repo(&token, "app", false).await;

    let base = "/git/acme/app.git/info/lfs";

    // Body "B" uploaded under the OID of "A".
    let (status, body) = app
        .raw_request(
            "PUT",
            &format!("{base}/objects/{OID_A}"),
            Some(&token),
            &[("content-length", "1")],
            b"B".to_vec(),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed["message"], "content hash does not match OID");

    // Neither downloadable nor verifiable afterwards.
    let (status, _) = app
        .raw_request(
            "GET",
            &format!("{base}/objects/{OID_A}"),
            Some(&token),
            &[],
            Vec::new(),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn lfs_rejects_admin_tokens_and_bad_oids() {
    if !git_available() {
        eprintln!("skipping: git not found in PATH");
        return;
    }

    let app = TestApp::new();
    let (_user_id, _ns_id, token) = app.create_user_with_token("acme").await;
    let _repo_id = app.create_repo(&token, "app", true).await;

    let base = "/git/acme/app.git/info/lfs";

    // Admin tokens are refused even for downloads on a public repo.
    let (status, _) = app
        .raw_request(
            "GET",
            &format!("{base}/objects/{OID_123}"),
            Some(&app.admin_token),
            &[],
            Vec::new(),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Malformed OIDs inside a batch get a per-object 422.
    let batch = json!({
        "operation": "upload",
        "objects": [{ "oid": "not-an-oid", "size": 1 }],
    });
    let (status, body) = app
        .raw_request(
            "POST",
            &format!("{base}/objects/batch"),
            Some(&token),
            &[("content-type", "application/vnd.git-lfs+json")],
            serde_json::to_vec(&batch).unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed["objects"][0]["error"]["code"], 422);
}

#[tokio::test]
async fn folder_lifecycle_and_force_delete() {
    if !git_available() {
        eprintln!("skipping: git not found in PATH");
        return;
    }

    let app = TestApp::new();
    let (_user_id, _ns_id, token) = app.create_user_with_token("acme").await;
    let repo_id = app.create_repo(&token, "app", false).await;

    let (status, body) = app
        .json_request(
            "POST",
            "/api/v1/folders",
            Some(&token),
            Some(json!({ "name": "Experiments", "color": "#ff0000" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["name"], "experiments");
    let folder_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .json_request(
            "POST",
            &format!("/api/v1/repos/{repo_id}/folders"),
            Some(&token),
            Some(json!({ "folder_ids": [folder_id] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // Non-empty folder refuses a plain delete.
    let (status, _) = app
        .json_request(
            "DELETE",
            &format!("/api/v1/folders/{folder_id}"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .json_request(
            "DELETE",
            &format!("/api/v1/folders/{folder_id}?force=true"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn expired_tokens_are_rejected() {
    let app = TestApp::new();
    let (user_id, _ns_id, _token) = app.create_user_with_token("acme").await;

    let (status, body) = app
        .json_request(
            "POST",
            &format!("/api/v1/admin/users/{user_id}/tokens"),
            Some(&app.admin_token),
            Some(json!({ "expires_in_seconds": 0 })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let expired = body["data"]["token"].as_str().unwrap().to_string();

    let (status, _) = app
        .json_request("GET", "/api/v1/namespace", Some(&expired), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

/// A user, a private repo, and the seeded three-commit history.
/// Returns `(repo_id, token, [c1, c2, c3])`.
async fn seeded_repo(app: &TestApp) -> (String, String, Vec<String>) {
    let (_user_id, ns_id, token) = app.create_user_with_token("acme").await;
    let repo_id = app.create_repo(&token, "app", false).await;
    let shas = app.seed_commit_history(&ns_id, "app");
    (repo_id, token, shas)
}

#[tokio::test]
async fn content_refs_sorted_default_branches_then_tags() {
    if !git_available() {
        eprintln!("skipping: git not found in PATH");
        return;
    }

    let app = TestApp::new();
    let (repo_id, token, shas) = seeded_repo(&app).await;

    let (status, body) = app
        .json_request("GET", &format!("/api/v1/repos/{repo_id}/refs"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let refs = body["data"].as_array().expect("refs array");
    let names: Vec<&str> = refs.iter().map(|r| r["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["main", "feature", "v0.1", "v1.0"]);

    let types: Vec<&str> = refs.iter().map(|r| r["type"].as_str().unwrap()).collect();
    assert_eq!(types, vec!["branch", "branch", "tag", "tag"]);

    assert_eq!(refs[0]["is_default"], true);
    assert_eq!(refs[1]["is_default"], false);
    assert_eq!(refs[0]["commit_sha"], shas[2].as_str());
    assert_eq!(refs[1]["commit_sha"], shas[1].as_str());
    // The lightweight tag points at its commit, the annotated one peels to it.
    assert_eq!(refs[2]["commit_sha"], shas[0].as_str());
    assert_eq!(refs[3]["commit_sha"], shas[2].as_str());
}

#[tokio::test]
async fn content_commits_paginate_newest_first() {
    if !git_available() {
        eprintln!("skipping: git not found in PATH");
        return;
    }

    let app = TestApp::new();
    let (repo_id, token, shas) = seeded_repo(&app).await;

    let (status, body) = app
        .json_request(
            "GET",
            &format!("/api/v1/repos/{repo_id}/commits?limit=2"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let page = body["data"].as_array().expect("commits array");
    assert_eq!(page.len(), 2);
    assert_eq!(page[0]["sha"], shas[2].as_str());
    assert_eq!(page[1]["sha"], shas[1].as_str());
    assert_eq!(body["has_more"], true);
    assert_eq!(body["next_cursor"], shas[1].as_str());
    assert!(page[0]["stats"]["files_changed"].is_number());

    // Following the cursor yields the remainder with no overlap.
    let (status, body) = app
        .json_request(
            "GET",
            &format!("/api/v1/repos/{repo_id}/commits?limit=2&cursor={}", shas[1]),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let page = body["data"].as_array().unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0]["sha"], shas[0].as_str());
    assert_eq!(body["has_more"], false);
    assert!(body["next_cursor"].is_null());
}

#[tokio::test]
async fn content_commits_filter_by_path_and_ref() {
    if !git_available() {
        eprintln!("skipping: git not found in PATH");
        return;
    }

    let app = TestApp::new();
    let (repo_id, token, shas) = seeded_repo(&app).await;

    // C3 only adds assets/notes, so README history is [C2, C1].
    let (status, body) = app
        .json_request(
            "GET",
            &format!("/api/v1/repos/{repo_id}/commits?path=README.md"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let readme_shas: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["sha"].as_str().unwrap())
        .collect();
    assert_eq!(readme_shas, vec![shas[1].as_str(), shas[0].as_str()]);

    // A directory prefix filters too: src/ was only touched in C1.
    let (status, body) = app
        .json_request(
            "GET",
            &format!("/api/v1/repos/{repo_id}/commits?path=src"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let src_shas: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["sha"].as_str().unwrap())
        .collect();
    assert_eq!(src_shas, vec![shas[0].as_str()]);

    // Walking from the feature branch starts at C2.
    let (status, body) = app
        .json_request(
            "GET",
            &format!("/api/v1/repos/{repo_id}/commits?ref=feature"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["sha"], shas[1].as_str());
}

#[tokio::test]
async fn content_single_commit_and_diff() {
    if !git_available() {
        eprintln!("skipping: git not found in PATH");
        return;
    }

    let app = TestApp::new();
    let (repo_id, token, shas) = seeded_repo(&app).await;

    let (status, body) = app
        .json_request(
            "GET",
            &format!("/api/v1/repos/{repo_id}/commits/{}", shas[2]),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["sha"], shas[2].as_str());
    assert_eq!(body["data"]["parent_shas"][0], shas[1].as_str());
    assert_eq!(body["data"]["message"], "Add assets");

    let (status, body) = app
        .json_request(
            "GET",
            &format!("/api/v1/repos/{repo_id}/commits/{}/diff", shas[1]),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["base_sha"], shas[0].as_str());
    assert_eq!(body["data"]["head_sha"], shas[1].as_str());
    assert_eq!(body["data"]["stats"]["files_changed"], 1);
    assert!(
        body["data"]["patch"]
            .as_str()
            .unwrap()
            .contains("README.md")
    );

    // A root commit diffs against the empty tree.
    let (status, body) = app
        .json_request(
            "GET",
            &format!("/api/v1/repos/{repo_id}/commits/{}/diff", shas[0]),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["base_sha"].is_null());
    assert_eq!(body["data"]["stats"]["files_changed"], 2);
}

#[tokio::test]
async fn content_compare_reports_ahead_behind_and_diff() {
    if !git_available() {
        eprintln!("skipping: git not found in PATH");
        return;
    }

    let app = TestApp::new();
    let (repo_id, token, shas) = seeded_repo(&app).await;

    let (status, body) = app
        .json_request(
            "GET",
            &format!("/api/v1/repos/{repo_id}/compare/{}...main", shas[0]),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let data = &body["data"];
    assert_eq!(data["merge_base_sha"], shas[0].as_str());
    assert_eq!(data["ahead_by"], 2);
    assert_eq!(data["behind_by"], 0);
    assert_eq!(data["base_sha"], shas[0].as_str());
    assert_eq!(data["head_sha"], shas[2].as_str());

    let commits: Vec<&str> = data["commits"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["sha"].as_str().unwrap())
        .collect();
    assert_eq!(commits, vec![shas[2].as_str(), shas[1].as_str()]);
    assert!(!data["diff"]["patch"].as_str().unwrap().is_empty());

    let (status, _) = app
        .json_request(
            "GET",
            &format!("/api/v1/repos/{repo_id}/compare/not-dots"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn content_tree_depth_clamp_and_ordering() {
    if !git_available() {
        eprintln!("skipping: git not found in PATH");
        return;
    }

    let app = TestApp::new();
    let (repo_id, token, _shas) = seeded_repo(&app).await;

    // Depth 1 (default): directories first, then files, alphabetic within.
    let (status, body) = app
        .json_request("GET", &format!("/api/v1/repos/{repo_id}/tree/main"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let entries = body["data"].as_array().expect("tree entries");
    let names: Vec<&str> = entries.iter().map(|e| e["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["assets", "notes", "src", "README.md"]);
    assert_eq!(entries[0]["type"], "dir");
    assert_eq!(entries[0]["has_children"], true);
    assert!(entries[0]["children"].is_null());
    assert_eq!(entries[3]["type"], "file");
    assert!(entries[3]["size"].is_number());

    // Depth 2 populates one level of children.
    let (status, body) = app
        .json_request(
            "GET",
            &format!("/api/v1/repos/{repo_id}/tree/main?depth=2"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let src = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["name"] == "src")
        .expect("src entry");
    assert_eq!(src["children"][0]["name"], "main.rs");
    assert_eq!(src["children"][0]["path"], "src/main.rs");

    // Subtree path.
    let (status, body) = app
        .json_request(
            "GET",
            &format!("/api/v1/repos/{repo_id}/tree/main/src"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["name"], "main.rs");
    assert_eq!(body["data"][0]["path"], "src/main.rs");

    // An out-of-range depth is clamped, not rejected.
    let (status, body) = app
        .json_request(
            "GET",
            &format!("/api/v1/repos/{repo_id}/tree/main?depth=99"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 4);

    // Unknown refs are a 404, not a 500.
    let (status, _) = app
        .json_request(
            "GET",
            &format!("/api/v1/repos/{repo_id}/tree/no-such-ref"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn content_blob_encoding_truncation_and_raw() {
    if !git_available() {
        eprintln!("skipping: git not found in PATH");
        return;
    }

    let app = TestApp::new();
    let (repo_id, token, _shas) = seeded_repo(&app).await;

    // Text blob: utf-8 inline.
    let (status, body) = app
        .json_request(
            "GET",
            &format!("/api/v1/repos/{repo_id}/blob/main/README.md"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["encoding"], "utf-8");
    assert_eq!(body["data"]["is_binary"], false);
    assert_eq!(body["data"]["is_truncated"], false);
    assert!(
        body["data"]["content"]
            .as_str()
            .unwrap()
            .contains("Test Repository")
    );

    // Binary blob: base64 inline.
    let (status, body) = app
        .json_request(
            "GET",
            &format!("/api/v1/repos/{repo_id}/blob/main/assets/logo.bin"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["encoding"], "base64");
    assert_eq!(body["data"]["is_binary"], true);

    // One byte past the inline cap: truncated to exactly the cap.
    let (status, body) = app
        .json_request(
            "GET",
            &format!("/api/v1/repos/{repo_id}/blob/main/notes/big.txt"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["is_truncated"], true);
    assert_eq!(body["data"]["size"], 1_048_577);
    assert_eq!(body["data"]["content"].as_str().unwrap().len(), 1_048_576);

    // raw=true streams the exact bytes.
    let (status, bytes) = app
        .raw_request(
            "GET",
            &format!("/api/v1/repos/{repo_id}/blob/main/assets/logo.bin?raw=true"),
            Some(&token),
            &[],
            Vec::new(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, [0x00, 0x01, 0x02, 0xff, 0xfe, 0x00]);

    // Asking for a directory as a blob is a 400.
    let (status, _) = app
        .json_request(
            "GET",
            &format!("/api/v1/repos/{repo_id}/blob/main/src"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn content_blame_covers_every_line() {
    if !git_available() {
        eprintln!("skipping: git not found in PATH");
        return;
    }

    let app = TestApp::new();
    let (repo_id, token, shas) = seeded_repo(&app).await;

    let (status, body) = app
        .json_request(
            "GET",
            &format!("/api/v1/repos/{repo_id}/blame/main/README.md"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["path"], "README.md");

    let lines = body["data"]["lines"].as_array().expect("blame lines");
    assert_eq!(lines.len(), 2);
    for (i, line) in lines.iter().enumerate() {
        assert_eq!(line["line"], i + 1);
        assert_eq!(line["author"]["name"], "Test User");
    }
    // The heading survives from C1 untouched; the body line was rewritten
    // in C2, so the two lines blame different commits.
    assert_eq!(lines[0]["text"], "# Test Repository");
    assert_eq!(lines[0]["sha"], shas[0].as_str());
    assert_eq!(lines[1]["sha"], shas[1].as_str());

    let (status, _) = app
        .json_request(
            "GET",
            &format!("/api/v1/repos/{repo_id}/blame/main/missing.txt"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn content_archive_formats() {
    if !git_available() {
        eprintln!("skipping: git not found in PATH");
        return;
    }

    let app = TestApp::new();
    let (repo_id, token, _shas) = seeded_repo(&app).await;

    let (status, bytes) = app
        .raw_request(
            "GET",
            &format!("/api/v1/repos/{repo_id}/archive/main?format=zip"),
            Some(&token),
            &[],
            Vec::new(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(bytes.starts_with(b"PK"), "zip magic missing");

    let (status, bytes) = app
        .raw_request(
            "GET",
            &format!("/api/v1/repos/{repo_id}/archive/main?format=tar.gz"),
            Some(&token),
            &[],
            Vec::new(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(bytes.starts_with(&[0x1f, 0x8b]), "gzip magic missing");

    let (status, _) = app
        .raw_request(
            "GET",
            &format!("/api/v1/repos/{repo_id}/archive/main?format=rar"),
            Some(&token),
            &[],
            Vec::new(),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn content_readme_lookup() {
    if !git_available() {
        eprintln!("skipping: git not found in PATH");
        return;
    }

    let app = TestApp::new();
    let (repo_id, token, _shas) = seeded_repo(&app).await;

    let (status, body) = app
        .json_request("GET", &format!("/api/v1/repos/{repo_id}/readme"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["filename"], "README.md");
    assert_eq!(body["data"]["is_binary"], false);
    assert!(
        body["data"]["content"]
            .as_str()
            .unwrap()
            .starts_with("# Test Repository")
    );
}

#[tokio::test]
async fn current_namespace_reports_primary() {
    let app = TestApp::new();
    let (_user_id, ns_id, token) = app.create_user_with_token("acme").await;

    let (status, body) = app
        .json_request("GET", "/api/v1/namespace", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], ns_id.as_str());
    assert_eq!(body["data"]["is_primary"], true);
}
