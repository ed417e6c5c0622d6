//! Askama templates for the web UI.

use crate::storage::models::{Host, Note, Service, Severity, Vuln};
use crate::web::flash::FlashMessage;
use askama::Template;
use chrono::{DateTime, Utc};

/// Base data available to all authenticated templates
pub struct BaseContext {
    pub username: String,
}

/// Login page template
#[derive(Template)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    pub flashes: Vec<FlashMessage>,
}

/// TOTP second-factor page
#[derive(Template)]
#[template(path = "auth/login_totp.html")]
pub struct TotpTemplate {
    pub error: Option<String>,
}

/// WebAuthn login page
#[derive(Template)]
#[template(path = "auth/login_webauthn.html")]
pub struct WebauthnLoginTemplate {
    pub flashes: Vec<FlashMessage>,
}

/// Registered credential summary for the profile page
pub struct CredentialSummary {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Account profile page
#[derive(Template)]
#[template(path = "auth/profile.html")]
pub struct ProfileTemplate {
    pub base: BaseContext,
    pub email: Option<String>,
    pub roles: Vec<String>,
    pub totp_enabled: bool,
    pub credentials: Vec<CredentialSummary>,
    pub flashes: Vec<FlashMessage>,
}

/// Dashboard with per-entity row counts
#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub base: BaseContext,
    pub nr_hosts: i64,
    pub nr_services: i64,
    pub nr_notes: i64,
    pub nr_vulns: i64,
}

/// Entity list pages only carry the DataTables client config; rows arrive
/// through the JSON feeds.
#[derive(Template)]
#[template(path = "storage/host_list.html")]
pub struct HostListTemplate {
    pub base: BaseContext,
}

#[derive(Template)]
#[template(path = "storage/service_list.html")]
pub struct ServiceListTemplate {
    pub base: BaseContext,
}

#[derive(Template)]
#[template(path = "storage/note_list.html")]
pub struct NoteListTemplate {
    pub base: BaseContext,
}

#[derive(Template)]
#[template(path = "storage/vuln_list.html")]
pub struct VulnListTemplate {
    pub base: BaseContext,
}

/// Host add/edit form; fields are prefilled for edit.
#[derive(Template)]
#[template(path = "storage/host_addedit.html")]
pub struct HostFormTemplate {
    pub base: BaseContext,
    pub form_url: String,
    pub address: String,
    pub hostname: String,
    pub os: String,
    pub comment: String,
}

#[derive(Template)]
#[template(path = "storage/service_addedit.html")]
pub struct ServiceFormTemplate {
    pub base: BaseContext,
    pub form_url: String,
    pub host_id: String,
    pub proto: String,
    pub port: String,
    pub state: String,
    pub name: String,
    pub info: String,
    pub comment: String,
}

#[derive(Template)]
#[template(path = "storage/note_addedit.html")]
pub struct NoteFormTemplate {
    pub base: BaseContext,
    pub form_url: String,
    pub host_id: String,
    pub service_id: String,
    pub ntype: String,
    pub data: String,
    pub comment: String,
}

#[derive(Template)]
#[template(path = "storage/vuln_addedit.html")]
pub struct VulnFormTemplate {
    pub base: BaseContext,
    pub form_url: String,
    pub host_id: String,
    pub service_id: String,
    pub name: String,
    pub xtype: String,
    pub severity: Severity,
    pub severities: [Severity; 6],
    pub descr: String,
    pub data: String,
    pub refs: String,
}

/// Host detail with nested services, notes and vulns
#[derive(Template)]
#[template(path = "storage/host_view.html")]
pub struct HostViewTemplate {
    pub base: BaseContext,
    pub host: Host,
    pub services: Vec<Service>,
    pub notes: Vec<Note>,
    pub vulns: Vec<Vuln>,
}

/// DNS hierarchy visualization page
#[derive(Template)]
#[template(path = "storage/vizdns.html")]
pub struct VizdnsTemplate {
    pub base: BaseContext,
    pub crop: usize,
}
