//! Statement table for the sparkify schema
//!
//! Every statement the loader issues is a fixed constant here, one per
//! entity and operation. Each constant also carries the metadata a non-SQL
//! engine needs to honour it: destination table, column order and conflict
//! policy.

/// Revision of the statement set below. Bump whenever a statement changes.
pub const STATEMENT_SET_VERSION: u32 = 1;

/// Destination tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TableName {
    Songs,
    Artists,
    Users,
    Time,
    Songplays,
}

/// A foreign key from `columns` of one table to `references` of `parent`
#[derive(Debug, Clone, Copy)]
pub struct ForeignKey {
    pub columns: &'static [&'static str],
    pub parent: TableName,
    pub references: &'static [&'static str],
}

impl TableName {
    pub const ALL: [TableName; 5] = [
        TableName::Songs,
        TableName::Artists,
        TableName::Users,
        TableName::Time,
        TableName::Songplays,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TableName::Songs => "songs",
            TableName::Artists => "artists",
            TableName::Users => "users",
            TableName::Time => "time",
            TableName::Songplays => "songplays",
        }
    }

    /// All columns in table order
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            TableName::Songs => &["song_id", "title", "artist_id", "year", "duration"],
            TableName::Artists => &["artist_id", "name", "location", "latitude", "longitude"],
            TableName::Users => &["user_id", "first_name", "last_name", "gender", "level"],
            TableName::Time => &["start_time", "hour", "day", "week", "month", "year", "weekday"],
            TableName::Songplays => &[
                "songplay_id",
                "start_time",
                "user_id",
                "level",
                "song_id",
                "artist_id",
                "session_id",
                "location",
                "user_agent",
            ],
        }
    }

    /// Primary key first, then any further unique constraints
    pub fn unique_keys(&self) -> &'static [&'static [&'static str]] {
        match self {
            TableName::Songs => &[&["song_id"]],
            TableName::Artists => &[&["artist_id"]],
            TableName::Users => &[&["user_id"]],
            TableName::Time => &[&["start_time"]],
            TableName::Songplays => &[&["songplay_id"], &["start_time", "user_id", "session_id"]],
        }
    }

    /// Serial column filled by the engine when omitted from an insert
    pub fn generated_column(&self) -> Option<&'static str> {
        match self {
            TableName::Songplays => Some("songplay_id"),
            _ => None,
        }
    }

    /// Enforced foreign keys. song_id/artist_id on songplays are left
    /// unconstrained: the song dataset covers only part of the logs.
    pub fn foreign_keys(&self) -> &'static [ForeignKey] {
        match self {
            TableName::Songplays => &[
                ForeignKey {
                    columns: &["start_time"],
                    parent: TableName::Time,
                    references: &["start_time"],
                },
                ForeignKey {
                    columns: &["user_id"],
                    parent: TableName::Users,
                    references: &["user_id"],
                },
            ],
            _ => &[],
        }
    }

    /// `COPY` statement loading every column of the table
    pub fn copy_sql(&self) -> &'static str {
        match self {
            TableName::Songs => "COPY songs FROM STDIN",
            TableName::Artists => "COPY artists FROM STDIN",
            TableName::Users => "COPY users FROM STDIN",
            TableName::Time => "COPY time FROM STDIN",
            TableName::Songplays => "COPY songplays FROM STDIN",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl std::fmt::Display for TableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a point write does when the primary key already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Keep the existing row (first write wins)
    DoNothing,
    /// Replace every non-key column (last write wins)
    Overwrite,
}

/// A parameterized single-row insert
#[derive(Debug, Clone, Copy)]
pub struct Statement {
    pub name: &'static str,
    pub table: TableName,
    /// Parameter order; `$1..$n` bind to these columns
    pub columns: &'static [&'static str],
    pub conflict: ConflictPolicy,
    pub sql: &'static str,
}

/// A read-only query
#[derive(Debug, Clone, Copy)]
pub struct Query {
    pub name: &'static str,
    pub columns: &'static [&'static str],
    pub sql: &'static str,
}

/// A `COPY ... FROM STDIN` with an explicit column list
#[derive(Debug, Clone, Copy)]
pub struct CopyStatement {
    pub name: &'static str,
    pub table: TableName,
    pub columns: &'static [&'static str],
    pub sql: &'static str,
}

// ============================================================================
// Point writes
// ============================================================================

pub const SONG_INSERT: Statement = Statement {
    name: "song_insert",
    table: TableName::Songs,
    columns: &["song_id", "title", "artist_id", "year", "duration"],
    conflict: ConflictPolicy::DoNothing,
    sql: r#"
        INSERT INTO songs (song_id, title, artist_id, year, duration)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (song_id) DO NOTHING
    "#,
};

pub const ARTIST_INSERT: Statement = Statement {
    name: "artist_insert",
    table: TableName::Artists,
    columns: &["artist_id", "name", "location", "latitude", "longitude"],
    conflict: ConflictPolicy::DoNothing,
    sql: r#"
        INSERT INTO artists (artist_id, name, location, latitude, longitude)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (artist_id) DO NOTHING
    "#,
};

pub const USER_UPSERT: Statement = Statement {
    name: "user_upsert",
    table: TableName::Users,
    columns: &["user_id", "first_name", "last_name", "gender", "level"],
    conflict: ConflictPolicy::Overwrite,
    sql: r#"
        INSERT INTO users (user_id, first_name, last_name, gender, level)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (user_id) DO UPDATE
            SET first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                gender = EXCLUDED.gender,
                level = EXCLUDED.level
    "#,
};

// ============================================================================
// Bulk loads
// ============================================================================

/// songplay_id is a serial, so the column list leaves it out
pub const SONGPLAY_COPY: CopyStatement = CopyStatement {
    name: "songplay_copy",
    table: TableName::Songplays,
    columns: &[
        "start_time",
        "user_id",
        "level",
        "song_id",
        "artist_id",
        "session_id",
        "location",
        "user_agent",
    ],
    sql: "COPY songplays (start_time, user_id, level, song_id, artist_id, session_id, location, user_agent) FROM STDIN",
};

// ============================================================================
// Queries
// ============================================================================

/// Full songs ⋈ artists reference set used to resolve songplay keys
pub const REFERENCE_SELECT: Query = Query {
    name: "reference_select",
    columns: &["song_id", "artist_id", "title", "artist_name", "duration"],
    sql: r#"
        SELECT s.song_id, a.artist_id, s.title, a.name AS artist_name, s.duration
        FROM songs s
        JOIN artists a ON a.artist_id = s.artist_id
        ORDER BY s.song_id
    "#,
};
