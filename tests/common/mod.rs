use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use ephemeral::auth::{TokenGenerator, provision};
use ephemeral::config::ServerConfig;
use ephemeral::server::{ServerState, create_router};
use ephemeral::store::{SqliteStore, Store};

/// An in-process server: the real router over a throwaway data directory.
pub struct TestApp {
    pub temp_dir: tempfile::TempDir,
    pub router: Router,
    pub admin_token: String,
}

impl TestApp {
    pub fn new() -> Self {
        let temp_dir = tempfile::TempDir::new().expect("create temp dir");

        let config = ServerConfig {
            data_dir: temp_dir.path().to_path_buf(),
            ..ServerConfig::default()
        };

        let store = SqliteStore::new(config.db_path()).expect("open store");
        store.initialize().expect("initialize store");

        let generator = TokenGenerator::new();
        let (_token, admin_token) =
            provision::generate_admin_token(&store, &generator, None).expect("mint admin token");

        let state = Arc::new(ServerState::new(Arc::new(store), &config));
        let router = create_router(state);

        Self {
            temp_dir,
            router,
            admin_token,
        }
    }

    pub fn data_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible");

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();

        (status, bytes.to_vec())
    }

    /// JSON request with optional bearer token and body.
    pub async fn json_request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }

        let request = match body {
            Some(value) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&value).unwrap())),
            None => builder.body(Body::empty()),
        }
        .expect("build request");

        let (status, bytes) = self.send(request).await;
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    /// Raw request for the Git/LFS wire surface.
    pub async fn raw_request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        headers: &[(&str, &str)],
        body: Vec<u8>,
    ) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let request = builder.body(Body::from(body)).expect("build request");
        self.send(request).await
    }

    /// Admin-side setup: a user owning `namespace_name` plus a fresh token.
    /// Returns `(user_id, namespace_id, token)`.
    pub async fn create_user_with_token(&self, namespace_name: &str) -> (String, String, String) {
        let (status, body) = self
            .json_request(
                "POST",
                "/api/v1/admin/users",
                Some(&self.admin_token),
                Some(serde_json::json!({ "namespace_name": namespace_name })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create user: {body}");

        let user_id = body["data"]["id"].as_str().expect("user id").to_string();
        let namespace_id = body["data"]["primary_namespace_id"]
            .as_str()
            .expect("namespace id")
            .to_string();

        let (status, body) = self
            .json_request(
                "POST",
                &format!("/api/v1/admin/users/{user_id}/tokens"),
                Some(&self.admin_token),
                Some(serde_json::json!({})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create token: {body}");

        let token = body["data"]["token"].as_str().expect("token").to_string();

        (user_id, namespace_id, token)
    }

    /// Creates a repo as the given user. Returns the repo id.
    pub async fn create_repo(&self, token: &str, name: &str, public: bool) -> String {
        let (status, body) = self
            .json_request(
                "POST",
                "/api/v1/repos",
                Some(token),
                Some(serde_json::json!({ "name": name, "public": public })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create repo: {body}");
        body["data"]["id"].as_str().expect("repo id").to_string()
    }

    pub fn repo_dir(&self, namespace_id: &str, repo_name: &str) -> PathBuf {
        self.data_dir()
            .join("repos")
            .join(namespace_id)
            .join(format!("{repo_name}.git"))
    }

    /// Seeds a known commit history into an already-created bare repo:
    ///
    /// - C1 "Initial commit": `README.md` v1 + `src/main.rs`
    /// - C2 "Revise readme": `README.md` v2 (on `main`; branch `feature`
    ///   also points here)
    /// - C3 "Add assets": `assets/logo.bin` (binary) + `notes/big.txt`
    ///   (just past the inline blob cap)
    ///
    /// Tags: lightweight `v0.1` at C1, annotated `v1.0` at C3. HEAD stays
    /// on `main`. Returns `[c1, c2, c3]` as hex SHAs.
    pub fn seed_commit_history(&self, namespace_id: &str, repo_name: &str) -> Vec<String> {
        let repo = git2::Repository::open_bare(self.repo_dir(namespace_id, repo_name))
            .expect("open bare repo");
        let sig = git2::Signature::now("Test User", "test@example.com").expect("signature");

        let blob = |data: &[u8]| repo.blob(data).expect("create blob");
        let readme_v1 = blob(b"# Test Repository\nFirst pass at the docs.\n");
        let readme_v2 = blob(b"# Test Repository\nRevised docs with more detail.\n");
        let main_rs = blob(b"fn main() { println!(\"hello\"); }\n");
        let logo_bin = blob(&[0x00, 0x01, 0x02, 0xff, 0xfe, 0x00]);
        let big_txt = blob(&vec![b'a'; 1_048_577]);

        let subtree = |name: &str, oid: git2::Oid| {
            let mut builder = repo.treebuilder(None).expect("treebuilder");
            builder.insert(name, oid, 0o100644).expect("insert blob");
            builder.write().expect("write tree")
        };
        let src_tree = subtree("main.rs", main_rs);
        let assets_tree = subtree("logo.bin", logo_bin);
        let notes_tree = subtree("big.txt", big_txt);

        fn root_tree<'r>(
            repo: &'r git2::Repository,
            readme: git2::Oid,
            src_tree: git2::Oid,
            extras: Option<(git2::Oid, git2::Oid)>,
        ) -> git2::Tree<'r> {
            let mut builder = repo.treebuilder(None).expect("treebuilder");
            builder.insert("README.md", readme, 0o100644).expect("insert readme");
            builder.insert("src", src_tree, 0o040000).expect("insert src");
            if let Some((assets, notes)) = extras {
                builder.insert("assets", assets, 0o040000).expect("insert assets");
                builder.insert("notes", notes, 0o040000).expect("insert notes");
            }
            let oid = builder.write().expect("write root tree");
            repo.find_tree(oid).expect("find root tree")
        }

        let tree1 = root_tree(&repo, readme_v1, src_tree, None);
        let c1 = repo
            .commit(Some("refs/heads/main"), &sig, &sig, "Initial commit", &tree1, &[])
            .expect("commit c1");

        let tree2 = root_tree(&repo, readme_v2, src_tree, None);
        let parent1 = repo.find_commit(c1).expect("find c1");
        let c2 = repo
            .commit(Some("refs/heads/main"), &sig, &sig, "Revise readme", &tree2, &[&parent1])
            .expect("commit c2");

        let tree3 = root_tree(&repo, readme_v2, src_tree, Some((assets_tree, notes_tree)));
        let parent2 = repo.find_commit(c2).expect("find c2");
        let c3 = repo
            .commit(Some("refs/heads/main"), &sig, &sig, "Add assets", &tree3, &[&parent2])
            .expect("commit c3");

        repo.reference("refs/heads/feature", c2, false, "branch feature")
            .expect("create feature branch");
        repo.reference("refs/tags/v0.1", c1, false, "tag v0.1")
            .expect("create lightweight tag");
        let c3_obj = repo.find_object(c3, None).expect("find c3 object");
        repo.tag("v1.0", &c3_obj, &sig, "release v1.0", false)
            .expect("create annotated tag");

        repo.set_head("refs/heads/main").expect("set HEAD");

        vec![c1.to_string(), c2.to_string(), c3.to_string()]
    }
}

/// Repo creation shells out to `git init --bare`; skip those tests when the
/// binary is missing.
pub fn git_available() -> bool {
    std::process::Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}
