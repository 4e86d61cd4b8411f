pub const SCHEMA: &str = r#"
-- Namespaces are the tenant boundary
CREATE TABLE IF NOT EXISTS namespaces (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT DEFAULT (datetime('now')),

    -- Soft limits, NULL = unlimited
    repo_limit INTEGER,
    storage_limit_bytes INTEGER,

    -- Opaque correlation id for an embedding platform
    external_id TEXT
);

-- Users own permissions; tokens are credentials for users
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    primary_namespace_id TEXT NOT NULL UNIQUE REFERENCES namespaces(id) ON DELETE CASCADE,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS repos (
    id TEXT PRIMARY KEY,
    namespace_id TEXT NOT NULL REFERENCES namespaces(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    description TEXT,

    -- If 1, anonymous read access is allowed
    public INTEGER DEFAULT 0,

    size_bytes INTEGER DEFAULT 0,
    last_push_at TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),

    UNIQUE(namespace_id, name)
);

-- Auth credentials. Admin tokens carry no user; user tokens always do.
CREATE TABLE IF NOT EXISTS tokens (
    id TEXT PRIMARY KEY,
    token_hash TEXT NOT NULL,          -- argon2id PHC string
    token_lookup TEXT NOT NULL,        -- first 8 chars of id, indexed for O(1) lookup
    name TEXT,
    is_admin INTEGER NOT NULL DEFAULT 0,
    user_id TEXT REFERENCES users(id) ON DELETE CASCADE,

    created_at TEXT DEFAULT (datetime('now')),
    expires_at TEXT,                   -- NULL = never
    last_used_at TEXT,

    CHECK ((is_admin = 1) = (user_id IS NULL))
);

-- Permissions a user holds over a namespace
CREATE TABLE IF NOT EXISTS namespace_grants (
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    namespace_id TEXT NOT NULL REFERENCES namespaces(id) ON DELETE CASCADE,
    allow_bits INTEGER NOT NULL DEFAULT 0,
    deny_bits INTEGER NOT NULL DEFAULT 0,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),
    PRIMARY KEY (user_id, namespace_id)
);

-- Permissions a user holds over a single repo
CREATE TABLE IF NOT EXISTS repo_grants (
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    repo_id TEXT NOT NULL REFERENCES repos(id) ON DELETE CASCADE,
    allow_bits INTEGER NOT NULL DEFAULT 0,
    deny_bits INTEGER NOT NULL DEFAULT 0,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),
    PRIMARY KEY (user_id, repo_id)
);

-- Flat folders for organizing repos within a namespace
CREATE TABLE IF NOT EXISTS folders (
    id TEXT PRIMARY KEY,
    namespace_id TEXT NOT NULL REFERENCES namespaces(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    color TEXT,
    created_at TEXT DEFAULT (datetime('now')),

    UNIQUE(namespace_id, name)
);

-- Many-to-many between repos and folders
CREATE TABLE IF NOT EXISTS repo_folders (
    repo_id TEXT REFERENCES repos(id) ON DELETE CASCADE,
    folder_id TEXT REFERENCES folders(id) ON DELETE CASCADE,
    PRIMARY KEY (repo_id, folder_id)
);

-- Catalogue of LFS objects held on disk
CREATE TABLE IF NOT EXISTS lfs_objects (
    repo_id TEXT NOT NULL REFERENCES repos(id) ON DELETE CASCADE,
    oid TEXT NOT NULL,
    size INTEGER NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),
    PRIMARY KEY (repo_id, oid)
);

CREATE INDEX IF NOT EXISTS idx_repos_namespace ON repos(namespace_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_tokens_lookup ON tokens(token_lookup);
CREATE INDEX IF NOT EXISTS idx_tokens_user ON tokens(user_id);
CREATE INDEX IF NOT EXISTS idx_folders_namespace ON folders(namespace_id);
CREATE INDEX IF NOT EXISTS idx_lfs_objects_repo ON lfs_objects(repo_id);
CREATE INDEX IF NOT EXISTS idx_namespace_grants_user ON namespace_grants(user_id);
CREATE INDEX IF NOT EXISTS idx_repo_grants_user ON repo_grants(user_id);
CREATE INDEX IF NOT EXISTS idx_users_primary_namespace ON users(primary_namespace_id);
"#;
