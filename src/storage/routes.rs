//! Inventory route handlers: list pages, DataTables feeds, CRUD forms,
//! bulk tag/delete operations and the DNS tree visualization.
//!
//! Everything here sits behind the `operator` role.

use crate::auth::session::{CurrentUser, OperatorUser, base_context};
use crate::error::WebError;
use crate::server::AppState;
use crate::storage::datatables::{Column, ColumnKind, DataTablesFeed, DataTablesParams};
use crate::storage::models::Severity;
use crate::storage::store::{
    Entity, HostFields, NoteFields, ServiceFields, TagAction, VulnFields,
};
use crate::storage::vizdns;
use crate::web::templates::{
    HostFormTemplate, HostListTemplate, HostViewTemplate, IndexTemplate, NoteFormTemplate,
    NoteListTemplate, ServiceFormTemplate, ServiceListTemplate, VizdnsTemplate, VulnFormTemplate,
    VulnListTemplate,
};
use askama::Template;
use axum::{
    Form, Json, Router,
    extract::{Path, Query, RawQuery, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tracing::info;

/// Build the storage router, mounted under `/storage`.
pub fn storage_router() -> Router<AppState> {
    Router::new()
        .route("/host/list", get(host_list))
        .route("/host/list.json", get(host_list_json).post(host_list_json))
        .route("/host/add", get(host_add_form).post(host_add))
        .route("/host/edit/{host_id}", get(host_edit_form).post(host_edit))
        .route("/host/delete/{host_id}", post(host_delete))
        .route("/host/annotate/{host_id}", post(host_annotate))
        .route("/host/tag_multiid", post(host_tag_multiid))
        .route("/host/delete_multiid", post(host_delete_multiid))
        .route("/host/view/{host_id}", get(host_view))
        .route("/host/vizdns", get(host_vizdns))
        .route("/host/vizdns.json", get(host_vizdns_json))
        .route("/service/list", get(service_list))
        .route(
            "/service/list.json",
            get(service_list_json).post(service_list_json),
        )
        .route("/service/add", get(service_add_form).post(service_add))
        .route(
            "/service/edit/{service_id}",
            get(service_edit_form).post(service_edit),
        )
        .route("/service/delete/{service_id}", post(service_delete))
        .route("/service/annotate/{service_id}", post(service_annotate))
        .route("/service/tag_multiid", post(service_tag_multiid))
        .route("/service/delete_multiid", post(service_delete_multiid))
        .route("/note/list", get(note_list))
        .route("/note/list.json", get(note_list_json).post(note_list_json))
        .route("/note/add", get(note_add_form).post(note_add))
        .route("/note/edit/{note_id}", get(note_edit_form).post(note_edit))
        .route("/note/delete/{note_id}", post(note_delete))
        .route("/note/annotate/{note_id}", post(note_annotate))
        .route("/note/tag_multiid", post(note_tag_multiid))
        .route("/note/delete_multiid", post(note_delete_multiid))
        .route("/vuln/list", get(vuln_list))
        .route("/vuln/list.json", get(vuln_list_json).post(vuln_list_json))
        .route("/vuln/add", get(vuln_add_form).post(vuln_add))
        .route("/vuln/edit/{vuln_id}", get(vuln_edit_form).post(vuln_edit))
        .route("/vuln/delete/{vuln_id}", post(vuln_delete))
        .route("/vuln/annotate/{vuln_id}", post(vuln_annotate))
        .route("/vuln/tag_multiid", post(vuln_tag_multiid))
        .route("/vuln/delete_multiid", post(vuln_delete_multiid))
}

fn render<T: Template>(template: T) -> Result<Html<String>, WebError> {
    Ok(Html(template.render()?))
}

fn opt(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn parse_id(value: &str) -> Result<i64, WebError> {
    value
        .trim()
        .parse()
        .map_err(|_| WebError::BadRequest(format!("invalid id: {value}")))
}

fn parse_opt_id(value: &str) -> Result<Option<i64>, WebError> {
    if value.trim().is_empty() {
        return Ok(None);
    }
    parse_id(value).map(Some)
}

/// Tag inputs arrive newline- or comma-separated.
fn split_tags(value: &str) -> Vec<String> {
    value
        .split(['\n', ','])
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

// -- dashboard --------------------------------------------------------------

/// `GET /` — entity counts for the landing page.
pub async fn dashboard(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Response, WebError> {
    let template = IndexTemplate {
        base: base_context(&user),
        nr_hosts: state.storage.count(Entity::Host).await?,
        nr_services: state.storage.count(Entity::Service).await?,
        nr_notes: state.storage.count(Entity::Note).await?,
        nr_vulns: state.storage.count(Entity::Vuln).await?,
    };
    Ok(render(template)?.into_response())
}

// -- DataTables feeds -------------------------------------------------------

const HOST_FEED: DataTablesFeed = DataTablesFeed {
    from: "hosts",
    columns: &[
        Column::new("id", "hosts.id", ColumnKind::Integer),
        Column::new("address", "hosts.address", ColumnKind::Text),
        Column::new("hostname", "hosts.hostname", ColumnKind::Text),
        Column::new("os", "hosts.os", ColumnKind::Text),
        Column::new(
            "nr_svcs",
            "(SELECT COUNT(*) FROM services WHERE services.host_id = hosts.id)",
            ColumnKind::Integer,
        )
        .not_searchable(),
        Column::new(
            "nr_notes",
            "(SELECT COUNT(*) FROM notes WHERE notes.host_id = hosts.id)",
            ColumnKind::Integer,
        )
        .not_searchable(),
        Column::new("tags", "hosts.tags", ColumnKind::Text),
        Column::new("comment", "hosts.comment", ColumnKind::Text),
    ],
};

const SERVICE_FEED: DataTablesFeed = DataTablesFeed {
    from: "services JOIN hosts ON services.host_id = hosts.id",
    columns: &[
        Column::new("id", "services.id", ColumnKind::Integer),
        Column::new("host_id", "services.host_id", ColumnKind::Integer).not_searchable(),
        Column::new("host_address", "hosts.address", ColumnKind::Text),
        Column::new("host_hostname", "hosts.hostname", ColumnKind::Text),
        Column::new("proto", "services.proto", ColumnKind::Text),
        Column::new("port", "services.port", ColumnKind::Integer),
        Column::new("state", "services.state", ColumnKind::Text),
        Column::new("name", "services.name", ColumnKind::Text),
        Column::new("info", "services.info", ColumnKind::Text),
        Column::new("tags", "services.tags", ColumnKind::Text),
        Column::new("comment", "services.comment", ColumnKind::Text),
    ],
};

const NOTE_FEED: DataTablesFeed = DataTablesFeed {
    from: "notes JOIN hosts ON notes.host_id = hosts.id",
    columns: &[
        Column::new("id", "notes.id", ColumnKind::Integer),
        Column::new("host_id", "notes.host_id", ColumnKind::Integer).not_searchable(),
        Column::new("host_address", "hosts.address", ColumnKind::Text),
        Column::new("host_hostname", "hosts.hostname", ColumnKind::Text),
        Column::new("service_id", "notes.service_id", ColumnKind::Integer).not_searchable(),
        Column::new("ntype", "notes.ntype", ColumnKind::Text),
        Column::new("data", "notes.data", ColumnKind::Text),
        Column::new("tags", "notes.tags", ColumnKind::Text),
        Column::new("comment", "notes.comment", ColumnKind::Text),
    ],
};

const VULN_FEED: DataTablesFeed = DataTablesFeed {
    from: "vulns JOIN hosts ON vulns.host_id = hosts.id",
    columns: &[
        Column::new("id", "vulns.id", ColumnKind::Integer),
        Column::new("host_id", "vulns.host_id", ColumnKind::Integer).not_searchable(),
        Column::new("host_address", "hosts.address", ColumnKind::Text),
        Column::new("host_hostname", "hosts.hostname", ColumnKind::Text),
        Column::new("name", "vulns.name", ColumnKind::Text),
        Column::new("xtype", "vulns.xtype", ColumnKind::Text),
        Column::new("severity", "vulns.severity", ColumnKind::Text).order_by(Severity::ORDER_EXPR),
        Column::new("refs", "vulns.refs", ColumnKind::Text),
        Column::new("tags", "vulns.tags", ColumnKind::Text),
        Column::new("comment", "vulns.comment", ColumnKind::Text),
    ],
};

/// Collect request parameters from the query string and, for POST, the
/// urlencoded body. DataTables sends either depending on configuration.
fn feed_params(query: Option<String>, body: &str) -> DataTablesParams {
    let mut pairs: Vec<(String, String)> = Vec::new();
    if let Some(query) = query {
        pairs.extend(
            url::form_urlencoded::parse(query.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned())),
        );
    }
    pairs.extend(
        url::form_urlencoded::parse(body.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned())),
    );
    DataTablesParams::from_pairs(&pairs)
}

async fn serve_feed(
    state: &AppState,
    feed: &DataTablesFeed,
    query: Option<String>,
    body: String,
) -> Result<Response, WebError> {
    let params = feed_params(query, &body);
    let response = feed.fetch(state.storage.pool(), &params).await?;
    Ok(Json(response).into_response())
}

async fn host_list_json(
    State(state): State<AppState>,
    OperatorUser(_): OperatorUser,
    RawQuery(query): RawQuery,
    body: String,
) -> Result<Response, WebError> {
    serve_feed(&state, &HOST_FEED, query, body).await
}

async fn service_list_json(
    State(state): State<AppState>,
    OperatorUser(_): OperatorUser,
    RawQuery(query): RawQuery,
    body: String,
) -> Result<Response, WebError> {
    serve_feed(&state, &SERVICE_FEED, query, body).await
}

async fn note_list_json(
    State(state): State<AppState>,
    OperatorUser(_): OperatorUser,
    RawQuery(query): RawQuery,
    body: String,
) -> Result<Response, WebError> {
    serve_feed(&state, &NOTE_FEED, query, body).await
}

async fn vuln_list_json(
    State(state): State<AppState>,
    OperatorUser(_): OperatorUser,
    RawQuery(query): RawQuery,
    body: String,
) -> Result<Response, WebError> {
    serve_feed(&state, &VULN_FEED, query, body).await
}

// -- bulk operations --------------------------------------------------------

#[derive(Deserialize)]
struct TagMultiidForm {
    tag: String,
    action: String,
    /// JSON array of row ids.
    ids: String,
}

#[derive(Deserialize)]
struct DeleteMultiidForm {
    ids: String,
}

#[derive(Deserialize)]
struct AnnotateForm {
    comment: String,
    tags: String,
}

fn parse_ids(raw: &str) -> Result<Vec<i64>, WebError> {
    serde_json::from_str(raw).map_err(|_| WebError::BadRequest("invalid ids".to_string()))
}

async fn do_tag_multiid(
    state: &AppState,
    entity: Entity,
    form: TagMultiidForm,
) -> Result<Response, WebError> {
    let action = match form.action.as_str() {
        "set" => TagAction::Set,
        "unset" => TagAction::Unset,
        other => {
            return Err(WebError::BadRequest(format!("invalid action: {other}")));
        }
    };
    let ids = parse_ids(&form.ids)?;
    state.storage.tag_multiid(entity, action, &ids, &form.tag).await?;
    Ok(StatusCode::OK.into_response())
}

async fn do_delete_multiid(
    state: &AppState,
    entity: Entity,
    form: DeleteMultiidForm,
) -> Result<Response, WebError> {
    let ids = parse_ids(&form.ids)?;
    let deleted = state.storage.delete_multiid(entity, &ids).await?;
    info!(entity = entity.table(), deleted, "storage.delete_multiid");
    Ok(StatusCode::OK.into_response())
}

async fn do_annotate(
    state: &AppState,
    entity: Entity,
    id: i64,
    form: AnnotateForm,
) -> Result<Response, WebError> {
    state
        .storage
        .annotate(entity, id, opt(form.comment).as_deref(), &split_tags(&form.tags))
        .await?;
    Ok(StatusCode::OK.into_response())
}

macro_rules! bulk_handlers {
    ($entity:expr, $tag:ident, $delete:ident, $annotate:ident) => {
        async fn $tag(
            State(state): State<AppState>,
            OperatorUser(_): OperatorUser,
            Form(form): Form<TagMultiidForm>,
        ) -> Result<Response, WebError> {
            do_tag_multiid(&state, $entity, form).await
        }

        async fn $delete(
            State(state): State<AppState>,
            OperatorUser(_): OperatorUser,
            Form(form): Form<DeleteMultiidForm>,
        ) -> Result<Response, WebError> {
            do_delete_multiid(&state, $entity, form).await
        }

        async fn $annotate(
            State(state): State<AppState>,
            OperatorUser(_): OperatorUser,
            Path(id): Path<i64>,
            Form(form): Form<AnnotateForm>,
        ) -> Result<Response, WebError> {
            do_annotate(&state, $entity, id, form).await
        }
    };
}

bulk_handlers!(Entity::Host, host_tag_multiid, host_delete_multiid, host_annotate);
bulk_handlers!(
    Entity::Service,
    service_tag_multiid,
    service_delete_multiid,
    service_annotate
);
bulk_handlers!(Entity::Note, note_tag_multiid, note_delete_multiid, note_annotate);
bulk_handlers!(Entity::Vuln, vuln_tag_multiid, vuln_delete_multiid, vuln_annotate);

// -- hosts ------------------------------------------------------------------

async fn host_list(OperatorUser(user): OperatorUser) -> Result<Response, WebError> {
    Ok(render(HostListTemplate {
        base: base_context(&user),
    })?
    .into_response())
}

#[derive(Deserialize)]
struct HostForm {
    address: String,
    hostname: String,
    os: String,
    comment: String,
}

impl HostForm {
    fn fields(&self) -> Result<HostFields, WebError> {
        let address = self.address.trim().to_string();
        if address.is_empty() {
            return Err(WebError::BadRequest("address is required".to_string()));
        }
        Ok(HostFields {
            address,
            hostname: opt(self.hostname.clone()),
            os: opt(self.os.clone()),
            comment: opt(self.comment.clone()),
        })
    }
}

async fn host_add_form(OperatorUser(user): OperatorUser) -> Result<Response, WebError> {
    Ok(render(HostFormTemplate {
        base: base_context(&user),
        form_url: "/storage/host/add".to_string(),
        address: String::new(),
        hostname: String::new(),
        os: String::new(),
        comment: String::new(),
    })?
    .into_response())
}

async fn host_add(
    State(state): State<AppState>,
    OperatorUser(_): OperatorUser,
    Form(form): Form<HostForm>,
) -> Result<Response, WebError> {
    let id = state.storage.create_host(&form.fields()?).await?;
    Ok(Redirect::to(&format!("/storage/host/view/{id}")).into_response())
}

async fn host_edit_form(
    State(state): State<AppState>,
    OperatorUser(user): OperatorUser,
    Path(host_id): Path<i64>,
) -> Result<Response, WebError> {
    let host = state.storage.get_host(host_id).await?.ok_or(WebError::NotFound)?;
    Ok(render(HostFormTemplate {
        base: base_context(&user),
        form_url: format!("/storage/host/edit/{host_id}"),
        address: host.address,
        hostname: host.hostname.unwrap_or_default(),
        os: host.os.unwrap_or_default(),
        comment: host.comment.unwrap_or_default(),
    })?
    .into_response())
}

async fn host_edit(
    State(state): State<AppState>,
    OperatorUser(_): OperatorUser,
    Path(host_id): Path<i64>,
    Form(form): Form<HostForm>,
) -> Result<Response, WebError> {
    if state.storage.get_host(host_id).await?.is_none() {
        return Err(WebError::NotFound);
    }
    state.storage.update_host(host_id, &form.fields()?).await?;
    Ok(Redirect::to(&format!("/storage/host/view/{host_id}")).into_response())
}

async fn host_delete(
    State(state): State<AppState>,
    OperatorUser(_): OperatorUser,
    Path(host_id): Path<i64>,
) -> Result<Response, WebError> {
    state.storage.delete_host(host_id).await?;
    Ok(Redirect::to("/storage/host/list").into_response())
}

async fn host_view(
    State(state): State<AppState>,
    OperatorUser(user): OperatorUser,
    Path(host_id): Path<i64>,
) -> Result<Response, WebError> {
    let host = state.storage.get_host(host_id).await?.ok_or(WebError::NotFound)?;
    let template = HostViewTemplate {
        base: base_context(&user),
        services: state.storage.services_by_host(host_id).await?,
        notes: state.storage.notes_by_host(host_id).await?,
        vulns: state.storage.vulns_by_host(host_id).await?,
        host,
    };
    Ok(render(template)?.into_response())
}

// -- DNS tree ---------------------------------------------------------------

#[derive(Deserialize)]
struct VizdnsQuery {
    crop: Option<usize>,
}

async fn host_vizdns(
    OperatorUser(user): OperatorUser,
    Query(query): Query<VizdnsQuery>,
) -> Result<Response, WebError> {
    Ok(render(VizdnsTemplate {
        base: base_context(&user),
        crop: query.crop.unwrap_or(1),
    })?
    .into_response())
}

async fn host_vizdns_json(
    State(state): State<AppState>,
    OperatorUser(_): OperatorUser,
    Query(query): Query<VizdnsQuery>,
) -> Result<Response, WebError> {
    let hostnames = state.storage.hostnames().await?;
    let graph = vizdns::hostname_graph(hostnames, query.crop.unwrap_or(1));
    Ok(Json(graph).into_response())
}

// -- services ---------------------------------------------------------------

async fn service_list(OperatorUser(user): OperatorUser) -> Result<Response, WebError> {
    Ok(render(ServiceListTemplate {
        base: base_context(&user),
    })?
    .into_response())
}

#[derive(Deserialize)]
struct ServiceForm {
    host_id: String,
    proto: String,
    port: String,
    state: String,
    name: String,
    info: String,
    comment: String,
}

impl ServiceForm {
    fn fields(&self) -> Result<ServiceFields, WebError> {
        let proto = self.proto.trim().to_string();
        if proto.is_empty() {
            return Err(WebError::BadRequest("proto is required".to_string()));
        }
        Ok(ServiceFields {
            host_id: parse_id(&self.host_id)?,
            proto,
            port: self
                .port
                .trim()
                .parse()
                .map_err(|_| WebError::BadRequest(format!("invalid port: {}", self.port)))?,
            state: opt(self.state.clone()),
            name: opt(self.name.clone()),
            info: opt(self.info.clone()),
            comment: opt(self.comment.clone()),
        })
    }
}

fn service_form_template(
    user: &crate::auth::store::User,
    form_url: String,
    service: Option<&crate::storage::models::Service>,
) -> ServiceFormTemplate {
    ServiceFormTemplate {
        base: base_context(user),
        form_url,
        host_id: service.map(|s| s.host_id.to_string()).unwrap_or_default(),
        proto: service.map(|s| s.proto.clone()).unwrap_or_default(),
        port: service.map(|s| s.port.to_string()).unwrap_or_default(),
        state: service.and_then(|s| s.state.clone()).unwrap_or_default(),
        name: service.and_then(|s| s.name.clone()).unwrap_or_default(),
        info: service.and_then(|s| s.info.clone()).unwrap_or_default(),
        comment: service.and_then(|s| s.comment.clone()).unwrap_or_default(),
    }
}

async fn service_add_form(OperatorUser(user): OperatorUser) -> Result<Response, WebError> {
    Ok(render(service_form_template(
        &user,
        "/storage/service/add".to_string(),
        None,
    ))?
    .into_response())
}

async fn service_add(
    State(state): State<AppState>,
    OperatorUser(_): OperatorUser,
    Form(form): Form<ServiceForm>,
) -> Result<Response, WebError> {
    let fields = form.fields()?;
    if state.storage.get_host(fields.host_id).await?.is_none() {
        return Err(WebError::BadRequest(format!(
            "unknown host id: {}",
            fields.host_id
        )));
    }
    state.storage.create_service(&fields).await?;
    Ok(Redirect::to("/storage/service/list").into_response())
}

async fn service_edit_form(
    State(state): State<AppState>,
    OperatorUser(user): OperatorUser,
    Path(service_id): Path<i64>,
) -> Result<Response, WebError> {
    let service = state
        .storage
        .get_service(service_id)
        .await?
        .ok_or(WebError::NotFound)?;
    Ok(render(service_form_template(
        &user,
        format!("/storage/service/edit/{service_id}"),
        Some(&service),
    ))?
    .into_response())
}

async fn service_edit(
    State(state): State<AppState>,
    OperatorUser(_): OperatorUser,
    Path(service_id): Path<i64>,
    Form(form): Form<ServiceForm>,
) -> Result<Response, WebError> {
    if state.storage.get_service(service_id).await?.is_none() {
        return Err(WebError::NotFound);
    }
    state.storage.update_service(service_id, &form.fields()?).await?;
    Ok(Redirect::to("/storage/service/list").into_response())
}

async fn service_delete(
    State(state): State<AppState>,
    OperatorUser(_): OperatorUser,
    Path(service_id): Path<i64>,
) -> Result<Response, WebError> {
    state.storage.delete_service(service_id).await?;
    Ok(Redirect::to("/storage/service/list").into_response())
}

// -- notes ------------------------------------------------------------------

async fn note_list(OperatorUser(user): OperatorUser) -> Result<Response, WebError> {
    Ok(render(NoteListTemplate {
        base: base_context(&user),
    })?
    .into_response())
}

#[derive(Deserialize)]
struct NoteForm {
    host_id: String,
    service_id: String,
    ntype: String,
    data: String,
    comment: String,
}

impl NoteForm {
    fn fields(&self) -> Result<NoteFields, WebError> {
        Ok(NoteFields {
            host_id: parse_id(&self.host_id)?,
            service_id: parse_opt_id(&self.service_id)?,
            ntype: opt(self.ntype.clone()),
            data: opt(self.data.clone()),
            comment: opt(self.comment.clone()),
        })
    }
}

fn note_form_template(
    user: &crate::auth::store::User,
    form_url: String,
    note: Option<&crate::storage::models::Note>,
) -> NoteFormTemplate {
    NoteFormTemplate {
        base: base_context(user),
        form_url,
        host_id: note.map(|n| n.host_id.to_string()).unwrap_or_default(),
        service_id: note
            .and_then(|n| n.service_id)
            .map(|id| id.to_string())
            .unwrap_or_default(),
        ntype: note.and_then(|n| n.ntype.clone()).unwrap_or_default(),
        data: note.and_then(|n| n.data.clone()).unwrap_or_default(),
        comment: note.and_then(|n| n.comment.clone()).unwrap_or_default(),
    }
}

async fn note_add_form(OperatorUser(user): OperatorUser) -> Result<Response, WebError> {
    Ok(render(note_form_template(&user, "/storage/note/add".to_string(), None))?.into_response())
}

async fn note_add(
    State(state): State<AppState>,
    OperatorUser(_): OperatorUser,
    Form(form): Form<NoteForm>,
) -> Result<Response, WebError> {
    let fields = form.fields()?;
    if state.storage.get_host(fields.host_id).await?.is_none() {
        return Err(WebError::BadRequest(format!(
            "unknown host id: {}",
            fields.host_id
        )));
    }
    state.storage.create_note(&fields).await?;
    Ok(Redirect::to("/storage/note/list").into_response())
}

async fn note_edit_form(
    State(state): State<AppState>,
    OperatorUser(user): OperatorUser,
    Path(note_id): Path<i64>,
) -> Result<Response, WebError> {
    let note = state.storage.get_note(note_id).await?.ok_or(WebError::NotFound)?;
    Ok(render(note_form_template(
        &user,
        format!("/storage/note/edit/{note_id}"),
        Some(&note),
    ))?
    .into_response())
}

async fn note_edit(
    State(state): State<AppState>,
    OperatorUser(_): OperatorUser,
    Path(note_id): Path<i64>,
    Form(form): Form<NoteForm>,
) -> Result<Response, WebError> {
    if state.storage.get_note(note_id).await?.is_none() {
        return Err(WebError::NotFound);
    }
    state.storage.update_note(note_id, &form.fields()?).await?;
    Ok(Redirect::to("/storage/note/list").into_response())
}

async fn note_delete(
    State(state): State<AppState>,
    OperatorUser(_): OperatorUser,
    Path(note_id): Path<i64>,
) -> Result<Response, WebError> {
    state.storage.delete_note(note_id).await?;
    Ok(Redirect::to("/storage/note/list").into_response())
}

// -- vulns ------------------------------------------------------------------

async fn vuln_list(OperatorUser(user): OperatorUser) -> Result<Response, WebError> {
    Ok(render(VulnListTemplate {
        base: base_context(&user),
    })?
    .into_response())
}

#[derive(Deserialize)]
struct VulnForm {
    host_id: String,
    service_id: String,
    name: String,
    xtype: String,
    severity: String,
    descr: String,
    data: String,
    refs: String,
}

impl VulnForm {
    fn fields(&self) -> Result<VulnFields, WebError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(WebError::BadRequest("name is required".to_string()));
        }
        Ok(VulnFields {
            host_id: parse_id(&self.host_id)?,
            service_id: parse_opt_id(&self.service_id)?,
            name,
            xtype: opt(self.xtype.clone()),
            severity: self
                .severity
                .parse()
                .map_err(|_| WebError::BadRequest(format!("invalid severity: {}", self.severity)))?,
            descr: opt(self.descr.clone()),
            data: opt(self.data.clone()),
            refs: split_tags(&self.refs),
        })
    }
}

fn vuln_form_template(
    user: &crate::auth::store::User,
    form_url: String,
    vuln: Option<&crate::storage::models::Vuln>,
) -> VulnFormTemplate {
    VulnFormTemplate {
        base: base_context(user),
        form_url,
        host_id: vuln.map(|v| v.host_id.to_string()).unwrap_or_default(),
        service_id: vuln
            .and_then(|v| v.service_id)
            .map(|id| id.to_string())
            .unwrap_or_default(),
        name: vuln.map(|v| v.name.clone()).unwrap_or_default(),
        xtype: vuln.and_then(|v| v.xtype.clone()).unwrap_or_default(),
        severity: vuln.map(|v| v.severity).unwrap_or_default(),
        severities: Severity::ALL,
        descr: vuln.and_then(|v| v.descr.clone()).unwrap_or_default(),
        data: vuln.and_then(|v| v.data.clone()).unwrap_or_default(),
        refs: vuln.map(|v| v.refs.join("\n")).unwrap_or_default(),
    }
}

async fn vuln_add_form(OperatorUser(user): OperatorUser) -> Result<Response, WebError> {
    Ok(render(vuln_form_template(&user, "/storage/vuln/add".to_string(), None))?.into_response())
}

async fn vuln_add(
    State(state): State<AppState>,
    OperatorUser(_): OperatorUser,
    Form(form): Form<VulnForm>,
) -> Result<Response, WebError> {
    let fields = form.fields()?;
    if state.storage.get_host(fields.host_id).await?.is_none() {
        return Err(WebError::BadRequest(format!(
            "unknown host id: {}",
            fields.host_id
        )));
    }
    state.storage.create_vuln(&fields).await?;
    Ok(Redirect::to("/storage/vuln/list").into_response())
}

async fn vuln_edit_form(
    State(state): State<AppState>,
    OperatorUser(user): OperatorUser,
    Path(vuln_id): Path<i64>,
) -> Result<Response, WebError> {
    let vuln = state.storage.get_vuln(vuln_id).await?.ok_or(WebError::NotFound)?;
    Ok(render(vuln_form_template(
        &user,
        format!("/storage/vuln/edit/{vuln_id}"),
        Some(&vuln),
    ))?
    .into_response())
}

async fn vuln_edit(
    State(state): State<AppState>,
    OperatorUser(_): OperatorUser,
    Path(vuln_id): Path<i64>,
    Form(form): Form<VulnForm>,
) -> Result<Response, WebError> {
    if state.storage.get_vuln(vuln_id).await?.is_none() {
        return Err(WebError::NotFound);
    }
    state.storage.update_vuln(vuln_id, &form.fields()?).await?;
    Ok(Redirect::to("/storage/vuln/list").into_response())
}

async fn vuln_delete(
    State(state): State<AppState>,
    OperatorUser(_): OperatorUser,
    Path(vuln_id): Path<i64>,
) -> Result<Response, WebError> {
    state.storage.delete_vuln(vuln_id).await?;
    Ok(Redirect::to("/storage/vuln/list").into_response())
}
