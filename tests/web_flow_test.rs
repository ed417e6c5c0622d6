//! Integration tests for the web flows.
//!
//! Each test boots the full application (SQLite in a temp directory, real
//! listener on an ephemeral port) and drives it with a cookie-holding HTTP
//! client, covering:
//! - password login branching (session, TOTP redirect, invalid credentials)
//! - session lifecycle (guarded routes, logout)
//! - host CRUD and the DataTables feed
//! - bulk tag/untag and annotate
//! - the DNS tree feed

#![cfg(feature = "sqlite")]

use base64::Engine;
use chrono::Utc;
use scopekeep::auth::store::UserStore;
use scopekeep::auth::totp;
use scopekeep::config::Config;
use scopekeep::db::Database;
use scopekeep::server::{build_router, build_state};
use serde_json::Value;
use tempfile::TempDir;

/// Running application plus the handles tests need.
struct TestFixture {
    _temp_dir: TempDir,
    base_url: String,
    users: UserStore,
}

impl TestFixture {
    async fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();

        let mut config = Config::default();
        config.server.cookie_secret =
            base64::engine::general_purpose::STANDARD.encode([7u8; 64]);

        let db = Database::new(&config.database, temp_dir.path()).await.unwrap();
        let users = UserStore::new(db.pool());

        let state = build_state(config, &db).unwrap();
        let app = build_router(state);

        // Find available port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            _temp_dir: temp_dir,
            base_url: format!("http://{addr}"),
            users,
        }
    }

    fn client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn add_operator(&self, username: &str, password: &str) {
        self.users
            .create_user(
                username,
                Some(password),
                Some(&format!("{username}@example.org")),
                &["user".to_string(), "operator".to_string()],
            )
            .await
            .unwrap();
    }

    /// Log in and leave the session cookie in the client's store.
    async fn login(&self, client: &reqwest::Client, username: &str, password: &str) {
        let resp = client
            .post(self.url("/auth/login"))
            .form(&[("username", username), ("password", password)])
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }
}

#[tokio::test]
async fn test_password_login_returns_profile_json() {
    let fixture = TestFixture::new().await;
    fixture.add_operator("admin", "correct horse").await;
    let client = fixture.client();

    let resp = client
        .post(fixture.url("/auth/login"))
        .form(&[("username", "admin"), ("password", "correct horse")])
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let profile: Value = resp.json().await.unwrap();
    assert_eq!(profile["username"], "admin");
    assert_eq!(profile["email"], "admin@example.org");
    assert!(profile["roles"].as_array().unwrap().contains(&Value::from("operator")));

    // The session now opens guarded pages.
    let resp = client.get(fixture.url("/storage/host/list")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_invalid_credentials_return_401_error_body() {
    let fixture = TestFixture::new().await;
    fixture.add_operator("admin", "correct horse").await;
    let client = fixture.client();

    for (username, password) in [
        ("admin", "wrong password"),
        ("nosuchuser", "whatever"),
    ] {
        let resp = client
            .post(fixture.url("/auth/login"))
            .form(&[("username", username), ("password", password)])
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 401);

        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["code"], 401);
        assert_eq!(body["error"]["message"], "Invalid credentials.");
    }
}

#[tokio::test]
async fn test_unauthenticated_browser_is_redirected_to_login() {
    let fixture = TestFixture::new().await;
    let client = fixture.client();

    for path in ["/", "/storage/host/list", "/storage/vuln/list.json"] {
        let resp = client.get(fixture.url(path)).send().await.unwrap();
        assert!(resp.status().is_redirection(), "{path} should redirect");
        assert_eq!(resp.headers()["location"], "/auth/login");
    }
}

#[tokio::test]
async fn test_totp_login_flow() {
    let fixture = TestFixture::new().await;
    fixture.add_operator("second", "factor pass").await;
    let secret = totp::generate_secret();
    fixture.users.set_totp_secret("second", Some(&secret)).await.unwrap();

    let client = fixture.client();

    // Correct password alone only reaches the second-factor step.
    let resp = client
        .post(fixture.url("/auth/login"))
        .form(&[("username", "second"), ("password", "factor pass")])
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_redirection());
    assert_eq!(resp.headers()["location"], "/auth/login_totp");

    // No session yet.
    let resp = client.get(fixture.url("/storage/host/list")).send().await.unwrap();
    assert!(resp.status().is_redirection());

    // Wrong code re-renders the form.
    let resp = client
        .post(fixture.url("/auth/login_totp"))
        .form(&[("code", "000000")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert!(resp.text().await.unwrap().contains("Invalid code"));

    // A fresh code completes the login.
    let code = totp::generate_code(
        &secret,
        totp::TotpAlgorithm::Sha1,
        totp::DIGITS,
        totp::PERIOD,
        Utc::now().timestamp(),
    )
    .unwrap();
    let resp = client
        .post(fixture.url("/auth/login_totp"))
        .form(&[("code", code.as_str())])
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_redirection());
    assert_eq!(resp.headers()["location"], "/");

    let resp = client.get(fixture.url("/storage/host/list")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_logout_invalidates_session() {
    let fixture = TestFixture::new().await;
    fixture.add_operator("admin", "correct horse").await;
    let client = fixture.client();
    fixture.login(&client, "admin", "correct horse").await;

    let resp = client.get(fixture.url("/auth/logout")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Successfully logged out.");

    let resp = client.get(fixture.url("/storage/host/list")).send().await.unwrap();
    assert!(resp.status().is_redirection());
}

#[tokio::test]
async fn test_host_crud_and_datatables_feed() {
    let fixture = TestFixture::new().await;
    fixture.add_operator("admin", "correct horse").await;
    let client = fixture.client();
    fixture.login(&client, "admin", "correct horse").await;

    // Create two hosts through the form.
    for (address, hostname) in [
        ("192.0.2.10", "web.example.org"),
        ("192.0.2.11", "db.example.org"),
    ] {
        let resp = client
            .post(fixture.url("/storage/host/add"))
            .form(&[
                ("address", address),
                ("hostname", hostname),
                ("os", ""),
                ("comment", ""),
            ])
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_redirection());
        let location = resp.headers()["location"].to_str().unwrap().to_string();
        assert!(location.starts_with("/storage/host/view/"));

        let resp = client.get(fixture.url(&location)).send().await.unwrap();
        assert_eq!(resp.status(), 200);
        assert!(resp.text().await.unwrap().contains(address));
    }

    // Unfiltered feed sees both rows.
    let resp = client
        .post(fixture.url("/storage/host/list.json"))
        .form(&[("draw", "1"), ("start", "0"), ("length", "10")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let feed: Value = resp.json().await.unwrap();
    assert_eq!(feed["draw"], "1");
    assert_eq!(feed["recordsTotal"], 2);
    assert_eq!(feed["recordsFiltered"], 2);
    assert_eq!(feed["data"].as_array().unwrap().len(), 2);

    // Global search narrows to one.
    let resp = client
        .post(fixture.url("/storage/host/list.json"))
        .form(&[
            ("draw", "2"),
            ("start", "0"),
            ("length", "10"),
            ("search[value]", "web.example"),
        ])
        .send()
        .await
        .unwrap();
    let feed: Value = resp.json().await.unwrap();
    assert_eq!(feed["recordsTotal"], 2);
    assert_eq!(feed["recordsFiltered"], 1);
    assert_eq!(feed["data"][0]["hostname"], "web.example.org");

    // Edit, then delete.
    let host_id = feed["data"][0]["id"].as_i64().unwrap();
    let resp = client
        .post(fixture.url(&format!("/storage/host/edit/{host_id}")))
        .form(&[
            ("address", "192.0.2.10"),
            ("hostname", "web.example.org"),
            ("os", "openbsd"),
            ("comment", "edge"),
        ])
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_redirection());

    let resp = client
        .get(fixture.url(&format!("/storage/host/view/{host_id}")))
        .send()
        .await
        .unwrap();
    assert!(resp.text().await.unwrap().contains("openbsd"));

    let resp = client
        .post(fixture.url(&format!("/storage/host/delete/{host_id}")))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_redirection());

    let resp = client
        .post(fixture.url("/storage/host/list.json"))
        .form(&[("draw", "3")])
        .send()
        .await
        .unwrap();
    let feed: Value = resp.json().await.unwrap();
    assert_eq!(feed["recordsTotal"], 1);
}

#[tokio::test]
async fn test_vuln_bulk_tagging_and_annotate() {
    let fixture = TestFixture::new().await;
    fixture.add_operator("admin", "correct horse").await;
    let client = fixture.client();
    fixture.login(&client, "admin", "correct horse").await;

    let resp = client
        .post(fixture.url("/storage/host/add"))
        .form(&[
            ("address", "192.0.2.20"),
            ("hostname", ""),
            ("os", ""),
            ("comment", ""),
        ])
        .send()
        .await
        .unwrap();
    let host_id = resp.headers()["location"]
        .to_str()
        .unwrap()
        .rsplit('/')
        .next()
        .unwrap()
        .to_string();

    // Two findings on the host.
    for name in ["weak ciphers", "default creds"] {
        let resp = client
            .post(fixture.url("/storage/vuln/add"))
            .form(&[
                ("host_id", host_id.as_str()),
                ("service_id", ""),
                ("name", name),
                ("xtype", ""),
                ("severity", "high"),
                ("descr", ""),
                ("data", ""),
                ("refs", ""),
            ])
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_redirection());
    }

    let resp = client
        .post(fixture.url("/storage/vuln/list.json"))
        .form(&[("draw", "1")])
        .send()
        .await
        .unwrap();
    let feed: Value = resp.json().await.unwrap();
    let ids: Vec<i64> = feed["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids.len(), 2);

    // Tag both, untag one.
    let ids_json = serde_json::to_string(&ids).unwrap();
    let resp = client
        .post(fixture.url("/storage/vuln/tag_multiid"))
        .form(&[
            ("tag", "Reviewed"),
            ("action", "set"),
            ("ids", ids_json.as_str()),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let one_id = serde_json::to_string(&ids[..1]).unwrap();
    let resp = client
        .post(fixture.url("/storage/vuln/tag_multiid"))
        .form(&[
            ("tag", "reviewed"),
            ("action", "unset"),
            ("ids", one_id.as_str()),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .post(fixture.url("/storage/vuln/list.json"))
        .form(&[("draw", "2")])
        .send()
        .await
        .unwrap();
    let feed: Value = resp.json().await.unwrap();
    let tags_by_id: Vec<(i64, String)> = feed["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| {
            (
                row["id"].as_i64().unwrap(),
                row["tags"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    for (id, tags) in tags_by_id {
        if id == ids[0] {
            assert_eq!(tags, "[]");
        } else {
            assert!(tags.contains("reviewed"));
        }
    }

    // Annotate sets comment and tags on one row.
    let resp = client
        .post(fixture.url(&format!("/storage/vuln/annotate/{}", ids[0])))
        .form(&[("comment", "false positive"), ("tags", "fp, triaged")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .post(fixture.url("/storage/vuln/list.json"))
        .form(&[("draw", "3"), ("search[value]", "false positive")])
        .send()
        .await
        .unwrap();
    let feed: Value = resp.json().await.unwrap();
    assert_eq!(feed["recordsFiltered"], 1);
    assert!(feed["data"][0]["tags"].as_str().unwrap().contains("fp"));

    // Bulk delete the selection.
    let resp = client
        .post(fixture.url("/storage/vuln/delete_multiid"))
        .form(&[("ids", ids_json.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .post(fixture.url("/storage/vuln/list.json"))
        .form(&[("draw", "4")])
        .send()
        .await
        .unwrap();
    let feed: Value = resp.json().await.unwrap();
    assert_eq!(feed["recordsTotal"], 0);
}

#[tokio::test]
async fn test_vizdns_feed() {
    let fixture = TestFixture::new().await;
    fixture.add_operator("admin", "correct horse").await;
    let client = fixture.client();
    fixture.login(&client, "admin", "correct horse").await;

    for (address, hostname) in [
        ("192.0.2.30", "a.prod.example.org"),
        ("192.0.2.31", "b.prod.example.org"),
        ("192.0.2.32", ""),
    ] {
        client
            .post(fixture.url("/storage/host/add"))
            .form(&[
                ("address", address),
                ("hostname", hostname),
                ("os", ""),
                ("comment", ""),
            ])
            .send()
            .await
            .unwrap();
    }

    let resp = client
        .get(fixture.url("/storage/host/vizdns.json?crop=1"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let graph: Value = resp.json().await.unwrap();

    let names: Vec<&str> = graph["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["name"].as_str().unwrap())
        .collect();
    // Shared suffix collapses into one spine under the synthetic root.
    assert_eq!(names, vec!["DOTROOT", "org", "example", "prod"]);
    assert_eq!(graph["links"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_oidc_disabled_flashes_and_redirects() {
    let fixture = TestFixture::new().await;
    let client = fixture.client();

    let resp = client.get(fixture.url("/auth/login_oidc")).send().await.unwrap();
    assert!(resp.status().is_redirection());
    assert_eq!(resp.headers()["location"], "/auth/login");

    // The flash shows up on the login page once and is then consumed.
    let resp = client.get(fixture.url("/auth/login")).send().await.unwrap();
    assert!(resp.text().await.unwrap().contains("OIDC not enabled"));
    let resp = client.get(fixture.url("/auth/login")).send().await.unwrap();
    assert!(!resp.text().await.unwrap().contains("OIDC not enabled"));
}
