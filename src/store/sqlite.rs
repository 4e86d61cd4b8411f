use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::Store;
use super::schema::SCHEMA;
use crate::error::{Error, Result};
use crate::types::*;

/// SQLite-backed [`Store`]. One open connection behind a mutex serialises
/// writes; WAL keeps readers unblocked across processes.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// SQLite LIMIT -1 means "no limit"; the trait contract is limit <= 0.
fn sql_limit(limit: i64) -> i64 {
    if limit <= 0 { -1 } else { limit }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // SQLite's own datetime('now') format
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("invalid datetime in database: '{s}' - {e}");
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn get_datetime(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    Ok(parse_datetime(&row.get::<_, String>(idx)?))
}

fn get_opt_datetime(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    Ok(row.get::<_, Option<String>>(idx)?.map(|s| parse_datetime(&s)))
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

// Row mappers, matched to the column order of the SELECTs below.

fn row_to_namespace(row: &Row<'_>) -> rusqlite::Result<Namespace> {
    Ok(Namespace {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: get_datetime(row, 2)?,
        repo_limit: row.get(3)?,
        storage_limit_bytes: row.get(4)?,
        external_id: row.get(5)?,
    })
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        primary_namespace_id: row.get(1)?,
        created_at: get_datetime(row, 2)?,
        updated_at: get_datetime(row, 3)?,
    })
}

fn row_to_token(row: &Row<'_>) -> rusqlite::Result<Token> {
    Ok(Token {
        id: row.get(0)?,
        token_hash: row.get(1)?,
        token_lookup: row.get(2)?,
        name: row.get(3)?,
        is_admin: row.get(4)?,
        user_id: row.get(5)?,
        created_at: get_datetime(row, 6)?,
        expires_at: get_opt_datetime(row, 7)?,
        last_used_at: get_opt_datetime(row, 8)?,
    })
}

fn row_to_repo(row: &Row<'_>) -> rusqlite::Result<Repo> {
    Ok(Repo {
        id: row.get(0)?,
        namespace_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        public: row.get(4)?,
        size_bytes: row.get(5)?,
        last_push_at: get_opt_datetime(row, 6)?,
        created_at: get_datetime(row, 7)?,
        updated_at: get_datetime(row, 8)?,
    })
}

fn row_to_folder(row: &Row<'_>) -> rusqlite::Result<Folder> {
    Ok(Folder {
        id: row.get(0)?,
        namespace_id: row.get(1)?,
        name: row.get(2)?,
        color: row.get(3)?,
        created_at: get_datetime(row, 4)?,
    })
}

fn row_to_namespace_grant(row: &Row<'_>) -> rusqlite::Result<NamespaceGrant> {
    Ok(NamespaceGrant {
        user_id: row.get(0)?,
        namespace_id: row.get(1)?,
        allow_bits: Permission::from(row.get::<_, i64>(2)?),
        deny_bits: Permission::from(row.get::<_, i64>(3)?),
        created_at: get_datetime(row, 4)?,
        updated_at: get_datetime(row, 5)?,
    })
}

fn row_to_repo_grant(row: &Row<'_>) -> rusqlite::Result<RepoGrant> {
    Ok(RepoGrant {
        user_id: row.get(0)?,
        repo_id: row.get(1)?,
        allow_bits: Permission::from(row.get::<_, i64>(2)?),
        deny_bits: Permission::from(row.get::<_, i64>(3)?),
        created_at: get_datetime(row, 4)?,
        updated_at: get_datetime(row, 5)?,
    })
}

fn row_to_lfs_object(row: &Row<'_>) -> rusqlite::Result<LfsObject> {
    Ok(LfsObject {
        repo_id: row.get(0)?,
        oid: row.get(1)?,
        size: row.get(2)?,
        created_at: get_datetime(row, 3)?,
    })
}

const NAMESPACE_COLS: &str = "id, name, created_at, repo_limit, storage_limit_bytes, external_id";
const USER_COLS: &str = "id, primary_namespace_id, created_at, updated_at";
const TOKEN_COLS: &str =
    "id, token_hash, token_lookup, name, is_admin, user_id, created_at, expires_at, last_used_at";
const REPO_COLS: &str =
    "id, namespace_id, name, description, public, size_bytes, last_push_at, created_at, updated_at";
const FOLDER_COLS: &str = "id, namespace_id, name, color, created_at";

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // Namespaces

    fn create_namespace(&self, ns: &Namespace) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO namespaces (id, name, created_at, repo_limit, storage_limit_bytes, external_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                ns.id,
                ns.name,
                format_datetime(&ns.created_at),
                ns.repo_limit,
                ns.storage_limit_bytes,
                ns.external_id,
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(Error::AlreadyExists),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_namespace(&self, id: &str) -> Result<Option<Namespace>> {
        self.conn()
            .query_row(
                &format!("SELECT {NAMESPACE_COLS} FROM namespaces WHERE id = ?1"),
                params![id],
                row_to_namespace,
            )
            .optional()
            .map_err(Error::from)
    }

    fn get_namespace_by_name(&self, name: &str) -> Result<Option<Namespace>> {
        self.conn()
            .query_row(
                &format!("SELECT {NAMESPACE_COLS} FROM namespaces WHERE name = ?1"),
                params![name],
                row_to_namespace,
            )
            .optional()
            .map_err(Error::from)
    }

    fn list_namespaces(&self, cursor: &str, limit: i64) -> Result<Vec<Namespace>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {NAMESPACE_COLS} FROM namespaces WHERE name > ?1 ORDER BY name LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![cursor, sql_limit(limit)], row_to_namespace)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_namespace(&self, ns: &Namespace) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE namespaces SET name = ?1, repo_limit = ?2, storage_limit_bytes = ?3, external_id = ?4
             WHERE id = ?5",
            params![ns.name, ns.repo_limit, ns.storage_limit_bytes, ns.external_id, ns.id],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn delete_namespace(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM namespaces WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Users

    fn create_user(&self, user: &User) -> Result<()> {
        self.conn().execute(
            "INSERT INTO users (id, primary_namespace_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                user.id,
                user.primary_namespace_id,
                format_datetime(&user.created_at),
                format_datetime(&user.updated_at),
            ],
        )?;
        Ok(())
    }

    fn get_user(&self, id: &str) -> Result<Option<User>> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLS} FROM users WHERE id = ?1"),
                params![id],
                row_to_user,
            )
            .optional()
            .map_err(Error::from)
    }

    fn get_user_by_primary_namespace_id(&self, namespace_id: &str) -> Result<Option<User>> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLS} FROM users WHERE primary_namespace_id = ?1"),
                params![namespace_id],
                row_to_user,
            )
            .optional()
            .map_err(Error::from)
    }

    fn list_users(&self, cursor: &str, limit: i64) -> Result<Vec<User>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_COLS} FROM users WHERE id > ?1 ORDER BY id LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![cursor, sql_limit(limit)], row_to_user)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_user(&self, user: &User) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE users SET primary_namespace_id = ?1, updated_at = ?2 WHERE id = ?3",
            params![
                user.primary_namespace_id,
                format_datetime(&Utc::now()),
                user.id
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn delete_user(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM users WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Tokens

    fn create_token(&self, token: &Token) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO tokens (id, token_hash, token_lookup, name, is_admin, user_id, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                token.id,
                token.token_hash,
                token.token_lookup,
                token.name,
                token.is_admin,
                token.user_id,
                format_datetime(&token.created_at),
                token.expires_at.as_ref().map(format_datetime),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(Error::TokenLookupCollision),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_token_by_id(&self, id: &str) -> Result<Option<Token>> {
        self.conn()
            .query_row(
                &format!("SELECT {TOKEN_COLS} FROM tokens WHERE id = ?1"),
                params![id],
                row_to_token,
            )
            .optional()
            .map_err(Error::from)
    }

    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>> {
        self.conn()
            .query_row(
                &format!("SELECT {TOKEN_COLS} FROM tokens WHERE token_lookup = ?1"),
                params![lookup],
                row_to_token,
            )
            .optional()
            .map_err(Error::from)
    }

    fn list_tokens(&self, cursor: &str, limit: i64) -> Result<Vec<Token>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TOKEN_COLS} FROM tokens WHERE id > ?1 ORDER BY id LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![cursor, sql_limit(limit)], row_to_token)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_user_tokens(&self, user_id: &str) -> Result<Vec<Token>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TOKEN_COLS} FROM tokens WHERE user_id = ?1 ORDER BY created_at DESC"
        ))?;
        let rows = stmt.query_map(params![user_id], row_to_token)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn delete_token(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM tokens WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn update_token_last_used(&self, id: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE tokens SET last_used_at = ?1 WHERE id = ?2",
            params![format_datetime(&Utc::now()), id],
        )?;
        Ok(())
    }

    fn has_admin_token(&self) -> Result<bool> {
        let count: i64 =
            self.conn()
                .query_row("SELECT COUNT(*) FROM tokens WHERE is_admin = 1", [], |row| {
                    row.get(0)
                })?;
        Ok(count > 0)
    }

    // Repos

    fn create_repo(&self, repo: &Repo) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO repos (id, namespace_id, name, description, public, size_bytes, last_push_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                repo.id,
                repo.namespace_id,
                repo.name,
                repo.description,
                repo.public,
                repo.size_bytes,
                repo.last_push_at.as_ref().map(format_datetime),
                format_datetime(&repo.created_at),
                format_datetime(&repo.updated_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            // UNIQUE(namespace_id, name): lets a racing auto-create recover
            // the winner's row instead of failing the push.
            Err(e) if is_constraint_violation(&e) => Err(Error::AlreadyExists),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_repo(&self, namespace_id: &str, name: &str) -> Result<Option<Repo>> {
        self.conn()
            .query_row(
                &format!("SELECT {REPO_COLS} FROM repos WHERE namespace_id = ?1 AND name = ?2"),
                params![namespace_id, name],
                row_to_repo,
            )
            .optional()
            .map_err(Error::from)
    }

    fn get_repo_by_id(&self, id: &str) -> Result<Option<Repo>> {
        self.conn()
            .query_row(
                &format!("SELECT {REPO_COLS} FROM repos WHERE id = ?1"),
                params![id],
                row_to_repo,
            )
            .optional()
            .map_err(Error::from)
    }

    fn list_repos(&self, namespace_id: &str, cursor: &str, limit: i64) -> Result<Vec<Repo>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {REPO_COLS} FROM repos WHERE namespace_id = ?1 AND name > ?2 ORDER BY name LIMIT ?3"
        ))?;
        let rows = stmt.query_map(params![namespace_id, cursor, sql_limit(limit)], row_to_repo)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_repo(&self, repo: &Repo) -> Result<()> {
        let result = self.conn().execute(
            "UPDATE repos SET name = ?1, description = ?2, public = ?3, updated_at = ?4 WHERE id = ?5",
            params![
                repo.name,
                repo.description,
                repo.public,
                format_datetime(&Utc::now()),
                repo.id
            ],
        );

        match result {
            Ok(0) => Err(Error::NotFound),
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(Error::AlreadyExists),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn delete_repo(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM repos WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn update_repo_last_push(&self, id: &str) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE repos SET last_push_at = ?1, updated_at = ?1 WHERE id = ?2",
            params![format_datetime(&Utc::now()), id],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn update_repo_size(&self, id: &str, size_bytes: i64) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE repos SET size_bytes = ?1, updated_at = ?2 WHERE id = ?3",
            params![size_bytes, format_datetime(&Utc::now()), id],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    // Folders

    fn create_folder(&self, folder: &Folder) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO folders (id, namespace_id, name, color, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                folder.id,
                folder.namespace_id,
                folder.name,
                folder.color,
                format_datetime(&folder.created_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(Error::AlreadyExists),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_folder(&self, id: &str) -> Result<Option<Folder>> {
        self.conn()
            .query_row(
                &format!("SELECT {FOLDER_COLS} FROM folders WHERE id = ?1"),
                params![id],
                row_to_folder,
            )
            .optional()
            .map_err(Error::from)
    }

    fn get_folder_by_name(&self, namespace_id: &str, name: &str) -> Result<Option<Folder>> {
        self.conn()
            .query_row(
                &format!("SELECT {FOLDER_COLS} FROM folders WHERE namespace_id = ?1 AND name = ?2"),
                params![namespace_id, name],
                row_to_folder,
            )
            .optional()
            .map_err(Error::from)
    }

    fn list_folders(&self, namespace_id: &str, cursor: &str, limit: i64) -> Result<Vec<Folder>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {FOLDER_COLS} FROM folders WHERE namespace_id = ?1 AND name > ?2 ORDER BY name LIMIT ?3"
        ))?;
        let rows = stmt.query_map(
            params![namespace_id, cursor, sql_limit(limit)],
            row_to_folder,
        )?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_folder(&self, folder: &Folder) -> Result<()> {
        let result = self.conn().execute(
            "UPDATE folders SET name = ?1, color = ?2 WHERE id = ?3",
            params![folder.name, folder.color, folder.id],
        );

        match result {
            Ok(0) => Err(Error::NotFound),
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(Error::AlreadyExists),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn delete_folder(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM folders WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn count_folder_repos(&self, id: &str) -> Result<i64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM repo_folders WHERE folder_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // Repo <-> folder membership

    fn add_repo_folder(&self, repo_id: &str, folder_id: &str) -> Result<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO repo_folders (repo_id, folder_id) VALUES (?1, ?2)",
            params![repo_id, folder_id],
        )?;
        Ok(())
    }

    fn remove_repo_folder(&self, repo_id: &str, folder_id: &str) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM repo_folders WHERE repo_id = ?1 AND folder_id = ?2",
            params![repo_id, folder_id],
        )?;
        Ok(rows > 0)
    }

    fn set_repo_folders(&self, repo_id: &str, folder_ids: &[String]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM repo_folders WHERE repo_id = ?1",
            params![repo_id],
        )?;
        for folder_id in folder_ids {
            tx.execute(
                "INSERT INTO repo_folders (repo_id, folder_id) VALUES (?1, ?2)",
                params![repo_id, folder_id],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn list_repo_folders(&self, repo_id: &str) -> Result<Vec<Folder>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT f.id, f.namespace_id, f.name, f.color, f.created_at
             FROM folders f
             JOIN repo_folders rf ON f.id = rf.folder_id
             WHERE rf.repo_id = ?1
             ORDER BY f.name",
        )?;
        let rows = stmt.query_map(params![repo_id], row_to_folder)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_folder_repos(&self, folder_id: &str) -> Result<Vec<Repo>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT r.id, r.namespace_id, r.name, r.description, r.public, r.size_bytes,
                    r.last_push_at, r.created_at, r.updated_at
             FROM repos r
             JOIN repo_folders rf ON r.id = rf.repo_id
             WHERE rf.folder_id = ?1
             ORDER BY r.name",
        )?;
        let rows = stmt.query_map(params![folder_id], row_to_repo)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // Namespace grants

    fn upsert_namespace_grant(&self, grant: &NamespaceGrant) -> Result<()> {
        // A namespace that is someone else's primary cannot be shared.
        if let Some(owner) = self.get_user_by_primary_namespace_id(&grant.namespace_id)? {
            if owner.id != grant.user_id {
                return Err(Error::PrimaryNamespaceGrant);
            }
        }

        self.conn().execute(
            "INSERT INTO namespace_grants (user_id, namespace_id, allow_bits, deny_bits, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (user_id, namespace_id) DO UPDATE SET
                allow_bits = excluded.allow_bits,
                deny_bits = excluded.deny_bits,
                updated_at = excluded.updated_at",
            params![
                grant.user_id,
                grant.namespace_id,
                i64::from(grant.allow_bits),
                i64::from(grant.deny_bits),
                format_datetime(&grant.created_at),
                format_datetime(&grant.updated_at),
            ],
        )?;
        Ok(())
    }

    fn get_namespace_grant(
        &self,
        user_id: &str,
        namespace_id: &str,
    ) -> Result<Option<NamespaceGrant>> {
        self.conn()
            .query_row(
                "SELECT user_id, namespace_id, allow_bits, deny_bits, created_at, updated_at
                 FROM namespace_grants WHERE user_id = ?1 AND namespace_id = ?2",
                params![user_id, namespace_id],
                row_to_namespace_grant,
            )
            .optional()
            .map_err(Error::from)
    }

    fn delete_namespace_grant(&self, user_id: &str, namespace_id: &str) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM namespace_grants WHERE user_id = ?1 AND namespace_id = ?2",
            params![user_id, namespace_id],
        )?;
        Ok(rows > 0)
    }

    fn list_user_namespace_grants(&self, user_id: &str) -> Result<Vec<NamespaceGrant>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT user_id, namespace_id, allow_bits, deny_bits, created_at, updated_at
             FROM namespace_grants WHERE user_id = ?1 ORDER BY namespace_id",
        )?;
        let rows = stmt.query_map(params![user_id], row_to_namespace_grant)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_namespace_grants_for_namespace(
        &self,
        namespace_id: &str,
    ) -> Result<Vec<NamespaceGrant>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT user_id, namespace_id, allow_bits, deny_bits, created_at, updated_at
             FROM namespace_grants WHERE namespace_id = ?1 ORDER BY user_id",
        )?;
        let rows = stmt.query_map(params![namespace_id], row_to_namespace_grant)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // Repo grants

    fn upsert_repo_grant(&self, grant: &RepoGrant) -> Result<()> {
        self.conn().execute(
            "INSERT INTO repo_grants (user_id, repo_id, allow_bits, deny_bits, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (user_id, repo_id) DO UPDATE SET
                allow_bits = excluded.allow_bits,
                deny_bits = excluded.deny_bits,
                updated_at = excluded.updated_at",
            params![
                grant.user_id,
                grant.repo_id,
                i64::from(grant.allow_bits),
                i64::from(grant.deny_bits),
                format_datetime(&grant.created_at),
                format_datetime(&grant.updated_at),
            ],
        )?;
        Ok(())
    }

    fn get_repo_grant(&self, user_id: &str, repo_id: &str) -> Result<Option<RepoGrant>> {
        self.conn()
            .query_row(
                "SELECT user_id, repo_id, allow_bits, deny_bits, created_at, updated_at
                 FROM repo_grants WHERE user_id = ?1 AND repo_id = ?2",
                params![user_id, repo_id],
                row_to_repo_grant,
            )
            .optional()
            .map_err(Error::from)
    }

    fn delete_repo_grant(&self, user_id: &str, repo_id: &str) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM repo_grants WHERE user_id = ?1 AND repo_id = ?2",
            params![user_id, repo_id],
        )?;
        Ok(rows > 0)
    }

    fn list_user_repo_grants(&self, user_id: &str) -> Result<Vec<RepoGrant>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT user_id, repo_id, allow_bits, deny_bits, created_at, updated_at
             FROM repo_grants WHERE user_id = ?1 ORDER BY repo_id",
        )?;
        let rows = stmt.query_map(params![user_id], row_to_repo_grant)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_user_repos_with_grants(&self, user_id: &str, namespace_id: &str) -> Result<Vec<Repo>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT r.id, r.namespace_id, r.name, r.description, r.public, r.size_bytes,
                    r.last_push_at, r.created_at, r.updated_at
             FROM repos r
             JOIN repo_grants g ON r.id = g.repo_id
             WHERE g.user_id = ?1 AND r.namespace_id = ?2
             ORDER BY r.name",
        )?;
        let rows = stmt.query_map(params![user_id, namespace_id], row_to_repo)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn has_repo_grants_in_namespace(&self, user_id: &str, namespace_id: &str) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM repo_grants g
             JOIN repos r ON r.id = g.repo_id
             WHERE g.user_id = ?1 AND r.namespace_id = ?2",
            params![user_id, namespace_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // LFS objects

    fn upsert_lfs_object(&self, obj: &LfsObject) -> Result<()> {
        // Concurrent uploads of the same OID both land here; last write wins
        // and the row is identical either way (content-addressed).
        self.conn().execute(
            "INSERT INTO lfs_objects (repo_id, oid, size, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (repo_id, oid) DO UPDATE SET size = excluded.size",
            params![
                obj.repo_id,
                obj.oid,
                obj.size,
                format_datetime(&obj.created_at),
            ],
        )?;
        Ok(())
    }

    fn get_lfs_object(&self, repo_id: &str, oid: &str) -> Result<Option<LfsObject>> {
        self.conn()
            .query_row(
                "SELECT repo_id, oid, size, created_at FROM lfs_objects WHERE repo_id = ?1 AND oid = ?2",
                params![repo_id, oid],
                row_to_lfs_object,
            )
            .optional()
            .map_err(Error::from)
    }

    fn list_lfs_objects(&self, repo_id: &str) -> Result<Vec<LfsObject>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT repo_id, oid, size, created_at FROM lfs_objects WHERE repo_id = ?1 ORDER BY oid",
        )?;
        let rows = stmt.query_map(params![repo_id], row_to_lfs_object)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn delete_lfs_object(&self, repo_id: &str, oid: &str) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM lfs_objects WHERE repo_id = ?1 AND oid = ?2",
            params![repo_id, oid],
        )?;
        Ok(rows > 0)
    }

    fn get_repo_lfs_size(&self, repo_id: &str) -> Result<i64> {
        let size: Option<i64> = self
            .conn()
            .query_row(
                "SELECT SUM(size) FROM lfs_objects WHERE repo_id = ?1",
                params![repo_id],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        Ok(size.unwrap_or(0))
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, SqliteStore) {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();
        (temp, store)
    }

    fn make_namespace(id: &str, name: &str) -> Namespace {
        Namespace {
            id: id.to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
            repo_limit: None,
            storage_limit_bytes: None,
            external_id: None,
        }
    }

    fn make_user(id: &str, ns_id: &str) -> User {
        let now = Utc::now();
        User {
            id: id.to_string(),
            primary_namespace_id: ns_id.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    fn make_repo(id: &str, ns_id: &str, name: &str) -> Repo {
        let now = Utc::now();
        Repo {
            id: id.to_string(),
            namespace_id: ns_id.to_string(),
            name: name.to_string(),
            description: None,
            public: false,
            size_bytes: 0,
            last_push_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn make_admin_token(id: &str, lookup: &str) -> Token {
        Token {
            id: id.to_string(),
            token_hash: "hash".to_string(),
            token_lookup: lookup.to_string(),
            name: None,
            is_admin: true,
            user_id: None,
            created_at: Utc::now(),
            expires_at: None,
            last_used_at: None,
        }
    }

    #[test]
    fn initialize_creates_tables() {
        let (_temp, store) = open_store();

        let conn = store.conn();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for table in [
            "namespaces",
            "users",
            "tokens",
            "repos",
            "folders",
            "repo_folders",
            "namespace_grants",
            "repo_grants",
            "lfs_objects",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }
    }

    #[test]
    fn namespace_crud() {
        let (_temp, store) = open_store();

        let mut ns = make_namespace("ns-1", "acme");
        ns.repo_limit = Some(10);
        store.create_namespace(&ns).unwrap();

        assert!(matches!(
            store.create_namespace(&make_namespace("ns-2", "acme")),
            Err(Error::AlreadyExists)
        ));

        let fetched = store.get_namespace("ns-1").unwrap().unwrap();
        assert_eq!(fetched.name, "acme");
        assert_eq!(fetched.repo_limit, Some(10));
        assert_eq!(
            store.get_namespace_by_name("acme").unwrap().unwrap().id,
            "ns-1"
        );

        assert!(store.delete_namespace("ns-1").unwrap());
        assert!(store.get_namespace("ns-1").unwrap().is_none());
    }

    #[test]
    fn token_lookup_collision_is_distinguished() {
        let (_temp, store) = open_store();

        store
            .create_token(&make_admin_token("token-1", "abcd1234"))
            .unwrap();

        let result = store.create_token(&make_admin_token("token-2", "abcd1234"));
        assert!(matches!(result, Err(Error::TokenLookupCollision)));
    }

    #[test]
    fn admin_xor_user_enforced_by_schema() {
        let (_temp, store) = open_store();

        let mut bad = make_admin_token("token-1", "aaaa1111");
        bad.user_id = Some("user-1".to_string());
        assert!(store.create_token(&bad).is_err());
    }

    #[test]
    fn primary_namespace_grant_is_protected() {
        let (_temp, store) = open_store();

        store.create_namespace(&make_namespace("ns-1", "owner")).unwrap();
        store.create_namespace(&make_namespace("ns-2", "other")).unwrap();
        store.create_user(&make_user("u-1", "ns-1")).unwrap();
        store.create_user(&make_user("u-2", "ns-2")).unwrap();

        let now = Utc::now();
        let grant = NamespaceGrant {
            user_id: "u-2".to_string(),
            namespace_id: "ns-1".to_string(),
            allow_bits: Permission::NAMESPACE_READ,
            deny_bits: Permission::empty(),
            created_at: now,
            updated_at: now,
        };
        assert!(matches!(
            store.upsert_namespace_grant(&grant),
            Err(Error::PrimaryNamespaceGrant)
        ));

        // The owner can still hold a grant on their own primary namespace.
        let own = NamespaceGrant {
            user_id: "u-1".to_string(),
            ..grant
        };
        store.upsert_namespace_grant(&own).unwrap();
    }

    #[test]
    fn namespace_delete_cascades() {
        let (_temp, store) = open_store();

        store.create_namespace(&make_namespace("ns-1", "acme")).unwrap();
        store.create_user(&make_user("u-1", "ns-1")).unwrap();
        store.create_repo(&make_repo("r-1", "ns-1", "app")).unwrap();

        let mut token = make_admin_token("t-1", "eeee0000");
        token.is_admin = false;
        token.user_id = Some("u-1".to_string());
        store.create_token(&token).unwrap();

        store
            .upsert_lfs_object(&LfsObject {
                repo_id: "r-1".to_string(),
                oid: "a".repeat(64),
                size: 3,
                created_at: Utc::now(),
            })
            .unwrap();

        assert!(store.delete_namespace("ns-1").unwrap());
        assert!(store.get_user("u-1").unwrap().is_none());
        assert!(store.get_repo_by_id("r-1").unwrap().is_none());
        assert!(store.get_token_by_id("t-1").unwrap().is_none());
        assert!(store.get_lfs_object("r-1", &"a".repeat(64)).unwrap().is_none());
    }

    #[test]
    fn repo_unique_per_namespace() {
        let (_temp, store) = open_store();

        store.create_namespace(&make_namespace("ns-1", "acme")).unwrap();
        store.create_repo(&make_repo("r-1", "ns-1", "app")).unwrap();
        assert!(matches!(
            store.create_repo(&make_repo("r-2", "ns-1", "app")),
            Err(Error::AlreadyExists)
        ));
    }

    #[test]
    fn lfs_upsert_is_idempotent() {
        let (_temp, store) = open_store();

        store.create_namespace(&make_namespace("ns-1", "acme")).unwrap();
        store.create_repo(&make_repo("r-1", "ns-1", "app")).unwrap();

        let obj = LfsObject {
            repo_id: "r-1".to_string(),
            oid: "b".repeat(64),
            size: 42,
            created_at: Utc::now(),
        };
        store.upsert_lfs_object(&obj).unwrap();
        store.upsert_lfs_object(&obj).unwrap();

        assert_eq!(store.list_lfs_objects("r-1").unwrap().len(), 1);
        assert_eq!(store.get_repo_lfs_size("r-1").unwrap(), 42);

        assert!(store.delete_lfs_object("r-1", &obj.oid).unwrap());
        assert!(!store.delete_lfs_object("r-1", &obj.oid).unwrap());
        assert_eq!(store.get_repo_lfs_size("r-1").unwrap(), 0);
    }

    #[test]
    fn user_update_and_delete() {
        let (_temp, store) = open_store();

        store.create_namespace(&make_namespace("ns-1", "one")).unwrap();
        store.create_namespace(&make_namespace("ns-2", "two")).unwrap();
        store.create_user(&make_user("u-1", "ns-1")).unwrap();

        let mut user = store.get_user("u-1").unwrap().unwrap();
        user.primary_namespace_id = "ns-2".to_string();
        store.update_user(&user).unwrap();
        assert_eq!(
            store.get_user("u-1").unwrap().unwrap().primary_namespace_id,
            "ns-2"
        );

        assert!(store.delete_user("u-1").unwrap());
        assert!(store.get_user("u-1").unwrap().is_none());
        assert!(matches!(store.update_user(&user), Err(Error::NotFound)));
    }

    #[test]
    fn pagination_is_complete_and_gapless() {
        let (_temp, store) = open_store();
        store.create_namespace(&make_namespace("ns-1", "acme")).unwrap();

        let mut names: Vec<String> = (0..25).map(|i| format!("repo-{i:02}")).collect();
        for (i, name) in names.iter().enumerate() {
            store
                .create_repo(&make_repo(&format!("r-{i}"), "ns-1", name))
                .unwrap();
        }
        names.sort();

        let mut collected = Vec::new();
        let mut cursor = String::new();
        loop {
            let page = store.list_repos("ns-1", &cursor, 7).unwrap();
            if page.is_empty() {
                break;
            }
            cursor = page.last().unwrap().name.clone();
            collected.extend(page.into_iter().map(|r| r.name));
        }

        assert_eq!(collected, names);
    }

    #[test]
    fn unlimited_listing() {
        let (_temp, store) = open_store();
        store.create_namespace(&make_namespace("ns-1", "acme")).unwrap();
        for i in 0..5 {
            store
                .create_repo(&make_repo(&format!("r-{i}"), "ns-1", &format!("repo-{i}")))
                .unwrap();
        }
        assert_eq!(store.list_repos("ns-1", "", 0).unwrap().len(), 5);
        assert_eq!(store.list_repos("ns-1", "", -1).unwrap().len(), 5);
    }
}
