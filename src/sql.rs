//! SQL query constants with database-specific placeholders.
//!
//! SQLite uses `?` placeholders, PostgreSQL uses `$1, $2, ...` numbered
//! placeholders. Statements that are built dynamically (DataTables feeds,
//! multi-id updates) use [`bind_marker`] instead.

/// Placeholder for the i-th bind parameter (1-based) in dynamic SQL.
#[cfg(feature = "sqlite")]
pub fn bind_marker(_i: usize) -> String {
    "?".to_string()
}

#[cfg(feature = "postgres")]
pub fn bind_marker(i: usize) -> String {
    format!("${i}")
}

// ---------------------------------------------------------------------------
// users
// ---------------------------------------------------------------------------

#[cfg(feature = "sqlite")]
pub const INSERT_USER: &str = r#"
    INSERT INTO users (username, password_hash, email, active, roles, totp_secret, created_at)
    VALUES (?, ?, ?, ?, ?, ?, ?)
"#;

#[cfg(feature = "postgres")]
pub const INSERT_USER: &str = r#"
    INSERT INTO users (username, password_hash, email, active, roles, totp_secret, created_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7)
"#;

#[cfg(feature = "sqlite")]
pub const SELECT_USER_BY_USERNAME: &str = "SELECT * FROM users WHERE username = ?";

#[cfg(feature = "postgres")]
pub const SELECT_USER_BY_USERNAME: &str = "SELECT * FROM users WHERE username = $1";

#[cfg(feature = "sqlite")]
pub const SELECT_USER_BY_ID: &str = "SELECT * FROM users WHERE id = ?";

#[cfg(feature = "postgres")]
pub const SELECT_USER_BY_ID: &str = "SELECT * FROM users WHERE id = $1";

#[cfg(feature = "sqlite")]
pub const SELECT_ACTIVE_USER_BY_EMAIL: &str =
    "SELECT * FROM users WHERE active = 1 AND email IS NOT NULL AND lower(email) = lower(?)";

#[cfg(feature = "postgres")]
pub const SELECT_ACTIVE_USER_BY_EMAIL: &str =
    "SELECT * FROM users WHERE active = 1 AND email IS NOT NULL AND lower(email) = lower($1)";

pub const SELECT_ALL_USERS: &str = "SELECT * FROM users ORDER BY username";

#[cfg(feature = "sqlite")]
pub const UPDATE_USER_PASSWORD: &str = "UPDATE users SET password_hash = ? WHERE username = ?";

#[cfg(feature = "postgres")]
pub const UPDATE_USER_PASSWORD: &str = "UPDATE users SET password_hash = $1 WHERE username = $2";

#[cfg(feature = "sqlite")]
pub const UPDATE_USER_TOTP: &str = "UPDATE users SET totp_secret = ? WHERE username = ?";

#[cfg(feature = "postgres")]
pub const UPDATE_USER_TOTP: &str = "UPDATE users SET totp_secret = $1 WHERE username = $2";

#[cfg(feature = "sqlite")]
pub const DELETE_USER: &str = "DELETE FROM users WHERE username = ?";

#[cfg(feature = "postgres")]
pub const DELETE_USER: &str = "DELETE FROM users WHERE username = $1";

// ---------------------------------------------------------------------------
// sessions
// ---------------------------------------------------------------------------

#[cfg(feature = "sqlite")]
pub const INSERT_SESSION: &str = r#"
    INSERT INTO sessions (session_id, user_id, created_at, expires_at)
    VALUES (?, ?, ?, ?)
"#;

#[cfg(feature = "postgres")]
pub const INSERT_SESSION: &str = r#"
    INSERT INTO sessions (session_id, user_id, created_at, expires_at)
    VALUES ($1, $2, $3, $4)
"#;

#[cfg(feature = "sqlite")]
pub const SELECT_SESSION: &str = "SELECT * FROM sessions WHERE session_id = ?";

#[cfg(feature = "postgres")]
pub const SELECT_SESSION: &str = "SELECT * FROM sessions WHERE session_id = $1";

#[cfg(feature = "sqlite")]
pub const DELETE_SESSION: &str = "DELETE FROM sessions WHERE session_id = ?";

#[cfg(feature = "postgres")]
pub const DELETE_SESSION: &str = "DELETE FROM sessions WHERE session_id = $1";

#[cfg(feature = "sqlite")]
pub const DELETE_SESSIONS_BY_USER: &str = "DELETE FROM sessions WHERE user_id = ?";

#[cfg(feature = "postgres")]
pub const DELETE_SESSIONS_BY_USER: &str = "DELETE FROM sessions WHERE user_id = $1";

#[cfg(feature = "sqlite")]
pub const DELETE_EXPIRED_SESSIONS: &str = "DELETE FROM sessions WHERE expires_at < ?";

#[cfg(feature = "postgres")]
pub const DELETE_EXPIRED_SESSIONS: &str = "DELETE FROM sessions WHERE expires_at < $1";

// ---------------------------------------------------------------------------
// webauthn credentials
// ---------------------------------------------------------------------------

#[cfg(feature = "sqlite")]
pub const INSERT_WEBAUTHN_CREDENTIAL: &str = r#"
    INSERT INTO webauthn_credentials (user_id, name, credential, created_at)
    VALUES (?, ?, ?, ?)
"#;

#[cfg(feature = "postgres")]
pub const INSERT_WEBAUTHN_CREDENTIAL: &str = r#"
    INSERT INTO webauthn_credentials (user_id, name, credential, created_at)
    VALUES ($1, $2, $3, $4)
"#;

#[cfg(feature = "sqlite")]
pub const SELECT_WEBAUTHN_CREDENTIALS_BY_USER: &str =
    "SELECT * FROM webauthn_credentials WHERE user_id = ? ORDER BY id";

#[cfg(feature = "postgres")]
pub const SELECT_WEBAUTHN_CREDENTIALS_BY_USER: &str =
    "SELECT * FROM webauthn_credentials WHERE user_id = $1 ORDER BY id";

#[cfg(feature = "sqlite")]
pub const UPDATE_WEBAUTHN_CREDENTIAL: &str =
    "UPDATE webauthn_credentials SET credential = ? WHERE id = ?";

#[cfg(feature = "postgres")]
pub const UPDATE_WEBAUTHN_CREDENTIAL: &str =
    "UPDATE webauthn_credentials SET credential = $1 WHERE id = $2";

#[cfg(feature = "sqlite")]
pub const DELETE_WEBAUTHN_CREDENTIAL: &str =
    "DELETE FROM webauthn_credentials WHERE id = ? AND user_id = ?";

#[cfg(feature = "postgres")]
pub const DELETE_WEBAUTHN_CREDENTIAL: &str =
    "DELETE FROM webauthn_credentials WHERE id = $1 AND user_id = $2";

// ---------------------------------------------------------------------------
// hosts
// ---------------------------------------------------------------------------

#[cfg(feature = "sqlite")]
pub const INSERT_HOST: &str = r#"
    INSERT INTO hosts (address, hostname, os, comment, tags, created_at, modified_at)
    VALUES (?, ?, ?, ?, ?, ?, ?)
    RETURNING id
"#;

#[cfg(feature = "postgres")]
pub const INSERT_HOST: &str = r#"
    INSERT INTO hosts (address, hostname, os, comment, tags, created_at, modified_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7)
    RETURNING id
"#;

#[cfg(feature = "sqlite")]
pub const SELECT_HOST: &str = "SELECT * FROM hosts WHERE id = ?";

#[cfg(feature = "postgres")]
pub const SELECT_HOST: &str = "SELECT * FROM hosts WHERE id = $1";

#[cfg(feature = "sqlite")]
pub const UPDATE_HOST: &str = r#"
    UPDATE hosts SET address = ?, hostname = ?, os = ?, comment = ?, modified_at = ?
    WHERE id = ?
"#;

#[cfg(feature = "postgres")]
pub const UPDATE_HOST: &str = r#"
    UPDATE hosts SET address = $1, hostname = $2, os = $3, comment = $4, modified_at = $5
    WHERE id = $6
"#;

#[cfg(feature = "sqlite")]
pub const DELETE_HOST: &str = "DELETE FROM hosts WHERE id = ?";

#[cfg(feature = "postgres")]
pub const DELETE_HOST: &str = "DELETE FROM hosts WHERE id = $1";

pub const SELECT_ALL_HOSTNAMES: &str =
    "SELECT hostname FROM hosts WHERE hostname IS NOT NULL AND hostname != ''";

pub const COUNT_HOSTS: &str = "SELECT COUNT(*) FROM hosts";

// ---------------------------------------------------------------------------
// services
// ---------------------------------------------------------------------------

#[cfg(feature = "sqlite")]
pub const INSERT_SERVICE: &str = r#"
    INSERT INTO services (host_id, proto, port, state, name, info, comment, tags, created_at, modified_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    RETURNING id
"#;

#[cfg(feature = "postgres")]
pub const INSERT_SERVICE: &str = r#"
    INSERT INTO services (host_id, proto, port, state, name, info, comment, tags, created_at, modified_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
    RETURNING id
"#;

#[cfg(feature = "sqlite")]
pub const SELECT_SERVICE: &str = "SELECT * FROM services WHERE id = ?";

#[cfg(feature = "postgres")]
pub const SELECT_SERVICE: &str = "SELECT * FROM services WHERE id = $1";

#[cfg(feature = "sqlite")]
pub const SELECT_SERVICES_BY_HOST: &str =
    "SELECT * FROM services WHERE host_id = ? ORDER BY port";

#[cfg(feature = "postgres")]
pub const SELECT_SERVICES_BY_HOST: &str =
    "SELECT * FROM services WHERE host_id = $1 ORDER BY port";

#[cfg(feature = "sqlite")]
pub const UPDATE_SERVICE: &str = r#"
    UPDATE services SET host_id = ?, proto = ?, port = ?, state = ?, name = ?, info = ?, comment = ?, modified_at = ?
    WHERE id = ?
"#;

#[cfg(feature = "postgres")]
pub const UPDATE_SERVICE: &str = r#"
    UPDATE services SET host_id = $1, proto = $2, port = $3, state = $4, name = $5, info = $6, comment = $7, modified_at = $8
    WHERE id = $9
"#;

#[cfg(feature = "sqlite")]
pub const DELETE_SERVICE: &str = "DELETE FROM services WHERE id = ?";

#[cfg(feature = "postgres")]
pub const DELETE_SERVICE: &str = "DELETE FROM services WHERE id = $1";

pub const COUNT_SERVICES: &str = "SELECT COUNT(*) FROM services";

// ---------------------------------------------------------------------------
// notes
// ---------------------------------------------------------------------------

#[cfg(feature = "sqlite")]
pub const INSERT_NOTE: &str = r#"
    INSERT INTO notes (host_id, service_id, ntype, data, comment, tags, created_at, modified_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
    RETURNING id
"#;

#[cfg(feature = "postgres")]
pub const INSERT_NOTE: &str = r#"
    INSERT INTO notes (host_id, service_id, ntype, data, comment, tags, created_at, modified_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    RETURNING id
"#;

#[cfg(feature = "sqlite")]
pub const SELECT_NOTE: &str = "SELECT * FROM notes WHERE id = ?";

#[cfg(feature = "postgres")]
pub const SELECT_NOTE: &str = "SELECT * FROM notes WHERE id = $1";

#[cfg(feature = "sqlite")]
pub const SELECT_NOTES_BY_HOST: &str = "SELECT * FROM notes WHERE host_id = ? ORDER BY id";

#[cfg(feature = "postgres")]
pub const SELECT_NOTES_BY_HOST: &str = "SELECT * FROM notes WHERE host_id = $1 ORDER BY id";

#[cfg(feature = "sqlite")]
pub const UPDATE_NOTE: &str = r#"
    UPDATE notes SET host_id = ?, service_id = ?, ntype = ?, data = ?, comment = ?, modified_at = ?
    WHERE id = ?
"#;

#[cfg(feature = "postgres")]
pub const UPDATE_NOTE: &str = r#"
    UPDATE notes SET host_id = $1, service_id = $2, ntype = $3, data = $4, comment = $5, modified_at = $6
    WHERE id = $7
"#;

#[cfg(feature = "sqlite")]
pub const DELETE_NOTE: &str = "DELETE FROM notes WHERE id = ?";

#[cfg(feature = "postgres")]
pub const DELETE_NOTE: &str = "DELETE FROM notes WHERE id = $1";

pub const COUNT_NOTES: &str = "SELECT COUNT(*) FROM notes";

// ---------------------------------------------------------------------------
// vulns
// ---------------------------------------------------------------------------

#[cfg(feature = "sqlite")]
pub const INSERT_VULN: &str = r#"
    INSERT INTO vulns (host_id, service_id, name, xtype, severity, descr, data, refs, tags, comment, created_at, modified_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    RETURNING id
"#;

#[cfg(feature = "postgres")]
pub const INSERT_VULN: &str = r#"
    INSERT INTO vulns (host_id, service_id, name, xtype, severity, descr, data, refs, tags, comment, created_at, modified_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
    RETURNING id
"#;

#[cfg(feature = "sqlite")]
pub const SELECT_VULN: &str = "SELECT * FROM vulns WHERE id = ?";

#[cfg(feature = "postgres")]
pub const SELECT_VULN: &str = "SELECT * FROM vulns WHERE id = $1";

#[cfg(feature = "sqlite")]
pub const SELECT_VULNS_BY_HOST: &str = "SELECT * FROM vulns WHERE host_id = ? ORDER BY id";

#[cfg(feature = "postgres")]
pub const SELECT_VULNS_BY_HOST: &str = "SELECT * FROM vulns WHERE host_id = $1 ORDER BY id";

#[cfg(feature = "sqlite")]
pub const UPDATE_VULN: &str = r#"
    UPDATE vulns SET host_id = ?, service_id = ?, name = ?, xtype = ?, severity = ?, descr = ?, data = ?, refs = ?, modified_at = ?
    WHERE id = ?
"#;

#[cfg(feature = "postgres")]
pub const UPDATE_VULN: &str = r#"
    UPDATE vulns SET host_id = $1, service_id = $2, name = $3, xtype = $4, severity = $5, descr = $6, data = $7, refs = $8, modified_at = $9
    WHERE id = $10
"#;

#[cfg(feature = "sqlite")]
pub const DELETE_VULN: &str = "DELETE FROM vulns WHERE id = ?";

#[cfg(feature = "postgres")]
pub const DELETE_VULN: &str = "DELETE FROM vulns WHERE id = $1";

pub const COUNT_VULNS: &str = "SELECT COUNT(*) FROM vulns";
