#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use asupersync::runtime::RuntimeBuilder;
use sqlmodel::prelude::*;

pub fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

pub fn expect_err<T>(outcome: Outcome<T, Error>) -> Error {
    match outcome {
        Outcome::Ok(_) => panic!("expected an error, got a value"),
        Outcome::Err(e) => e,
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

/// Run `f` on a current-thread runtime with a test context.
pub fn run<F, Fut>(f: F)
where
    F: FnOnce(Cx) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    rt.block_on(f(cx));
}

fn int_of(value: Value) -> i64 {
    value.as_i64().unwrap_or_default()
}

fn text_of(value: Value) -> String {
    value.as_str().map(str::to_string).unwrap_or_default()
}

fn bytes_of(value: Value) -> Vec<u8> {
    value.as_bytes().map(<[u8]>::to_vec).unwrap_or_default()
}

fn required_id(row: &Row, table: &str) -> Result<i64> {
    row.get_named("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| Error::mapping(format!("{table}.id missing from row")))
}

fn column(row: &Row, name: &str) -> Value {
    row.get_named(name).cloned().unwrap_or(Value::Null)
}

// ============================================================================
// Models
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub isbn: String,
    pub summary: String,
    pub cover: Vec<u8>,
    pub thumbnail: Vec<u8>,
    pub author_id: i64,
}

impl Model for Book {
    const TABLE_NAME: &'static str = "books";
    const PRIMARY_KEY: &'static [&'static str] = &["id"];

    fn fields() -> &'static [FieldInfo] {
        static FIELDS: &[FieldInfo] = &[
            FieldInfo::new("id", "id").primary_key(true),
            FieldInfo::new("title", "title"),
            FieldInfo::new("isbn", "isbn"),
            FieldInfo::new("summary", "summary").deferred(),
            FieldInfo::new("cover", "cover_image").defer_group("media"),
            FieldInfo::new("thumbnail", "thumbnail").defer_group("media"),
            FieldInfo::new("author_id", "author_id").foreign_key("authors.id"),
        ];
        FIELDS
    }

    fn relationships() -> &'static [RelationshipInfo] {
        static RELS: &[RelationshipInfo] =
            &[RelationshipInfo::to::<Author>("author", RelationshipKind::ManyToOne)
                .local_key("author_id")
                .back_populates("books")];
        RELS
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", Value::BigInt(self.id)),
            ("title", Value::from(self.title.as_str())),
            ("isbn", Value::from(self.isbn.as_str())),
            ("summary", Value::from(self.summary.as_str())),
            ("cover", Value::Bytes(self.cover.clone())),
            ("thumbnail", Value::Bytes(self.thumbnail.clone())),
            ("author_id", Value::BigInt(self.author_id)),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: required_id(row, "books")?,
            title: text_of(column(row, "title")),
            isbn: text_of(column(row, "isbn")),
            summary: text_of(column(row, "summary")),
            cover: bytes_of(column(row, "cover_image")),
            thumbnail: bytes_of(column(row, "thumbnail")),
            author_id: int_of(column(row, "author_id")),
        })
    }

    fn primary_key_value(&self) -> Vec<Value> {
        vec![Value::BigInt(self.id)]
    }

    fn set_attribute(&mut self, name: &str, value: Value) -> Result<()> {
        match name {
            "id" => self.id = int_of(value),
            "title" => self.title = text_of(value),
            "isbn" => self.isbn = text_of(value),
            "summary" => self.summary = text_of(value),
            "cover" => self.cover = bytes_of(value),
            "thumbnail" => self.thumbnail = bytes_of(value),
            "author_id" => self.author_id = int_of(value),
            other => return Err(Error::mapping(format!("books has no attribute '{other}'"))),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Author {
    pub id: i64,
    pub name: String,
    pub bio: String,
    pub photo: Vec<u8>,
    pub notes: String,
}

impl Model for Author {
    const TABLE_NAME: &'static str = "authors";
    const PRIMARY_KEY: &'static [&'static str] = &["id"];

    fn fields() -> &'static [FieldInfo] {
        static FIELDS: &[FieldInfo] = &[
            FieldInfo::new("id", "id").primary_key(true),
            FieldInfo::new("name", "name"),
            FieldInfo::new("bio", "bio").defer_group("profile"),
            FieldInfo::new("photo", "photo").defer_group("profile"),
            FieldInfo::new("notes", "notes").defer_raiseload(),
        ];
        FIELDS
    }

    fn relationships() -> &'static [RelationshipInfo] {
        static RELS: &[RelationshipInfo] =
            &[RelationshipInfo::to::<Book>("books", RelationshipKind::OneToMany)
                .remote_key("author_id")
                .back_populates("author")];
        RELS
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", Value::BigInt(self.id)),
            ("name", Value::from(self.name.as_str())),
            ("bio", Value::from(self.bio.as_str())),
            ("photo", Value::Bytes(self.photo.clone())),
            ("notes", Value::from(self.notes.as_str())),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: required_id(row, "authors")?,
            name: text_of(column(row, "name")),
            bio: text_of(column(row, "bio")),
            photo: bytes_of(column(row, "photo")),
            notes: text_of(column(row, "notes")),
        })
    }

    fn primary_key_value(&self) -> Vec<Value> {
        vec![Value::BigInt(self.id)]
    }

    fn set_attribute(&mut self, name: &str, value: Value) -> Result<()> {
        match name {
            "id" => self.id = int_of(value),
            "name" => self.name = text_of(value),
            "bio" => self.bio = text_of(value),
            "photo" => self.photo = bytes_of(value),
            "notes" => self.notes = text_of(value),
            other => return Err(Error::mapping(format!("authors has no attribute '{other}'"))),
        }
        Ok(())
    }
}

// ============================================================================
// Recording connection
// ============================================================================

type StoredRow = HashMap<String, Value>;

#[derive(Default)]
struct MockDb {
    tables: HashMap<String, Vec<StoredRow>>,
    queries: Vec<String>,
    statements: Vec<String>,
}

/// In-memory connection understanding the SELECT shapes the session emits:
/// column lists (optionally `table."col" AS "label"`), comma-joined tables,
/// `=` / `IN` conditions joined by AND, ORDER BY (ignored) and LIMIT.
#[derive(Default)]
pub struct MockConnection {
    db: Mutex<MockDb>,
}

impl MockConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the standard fixture: two authors, three books.
    pub fn library() -> Self {
        let conn = Self::new();
        conn.insert(
            "authors",
            &[
                ("id", Value::BigInt(1)),
                ("name", Value::from("Ursula K. Le Guin")),
                ("bio", Value::from("Wrote Earthsea.")),
                ("photo", Value::Bytes(vec![1, 2, 3])),
                ("notes", Value::from("internal")),
            ],
        );
        conn.insert(
            "authors",
            &[
                ("id", Value::BigInt(2)),
                ("name", Value::from("Frank Herbert")),
                ("bio", Value::from("Wrote Dune.")),
                ("photo", Value::Bytes(vec![4, 5])),
                ("notes", Value::from("internal")),
            ],
        );
        for (id, title, author) in [
            (10, "A Wizard of Earthsea", 1),
            (11, "The Left Hand of Darkness", 1),
            (12, "Dune", 2),
        ] {
            conn.insert(
                "books",
                &[
                    ("id", Value::BigInt(id)),
                    ("title", Value::from(title)),
                    ("isbn", Value::from(format!("isbn-{id}"))),
                    ("summary", Value::from(format!("summary of {title}"))),
                    ("cover_image", Value::Bytes(vec![9; 4])),
                    ("thumbnail", Value::Bytes(vec![7; 2])),
                    ("author_id", Value::BigInt(author)),
                ],
            );
        }
        conn
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockDb> {
        self.db.lock().expect("mock db lock")
    }

    pub fn insert(&self, table: &str, row: &[(&str, Value)]) {
        let row = row
            .iter()
            .map(|(c, v)| ((*c).to_string(), v.clone()))
            .collect();
        self.lock()
            .tables
            .entry(table.to_string())
            .or_default()
            .push(row);
    }

    /// Overwrite one column of the row with primary key `id`.
    pub fn update(&self, table: &str, id: i64, column: &str, value: Value) {
        let mut db = self.lock();
        for row in db.tables.entry(table.to_string()).or_default() {
            if row.get("id") == Some(&Value::BigInt(id)) {
                row.insert(column.to_string(), value.clone());
            }
        }
    }

    pub fn delete(&self, table: &str, id: i64) {
        self.lock()
            .tables
            .entry(table.to_string())
            .or_default()
            .retain(|row| row.get("id") != Some(&Value::BigInt(id)));
    }

    /// SELECTs issued so far.
    pub fn queries(&self) -> Vec<String> {
        self.lock().queries.clone()
    }

    pub fn query_count(&self) -> usize {
        self.lock().queries.len()
    }

    /// Non-query statements (BEGIN/COMMIT/ROLLBACK) issued so far.
    pub fn statements(&self) -> Vec<String> {
        self.lock().statements.clone()
    }

    pub fn clear_log(&self) {
        let mut db = self.lock();
        db.queries.clear();
        db.statements.clear();
    }

    fn select(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let mut db = self.lock();
        db.queries.push(sql.to_string());
        evaluate(&db.tables, sql, params)
            .ok_or_else(|| Error::Custom(format!("mock cannot evaluate: {sql}")))
    }
}

fn unquote(s: &str) -> &str {
    s.trim().trim_matches('"')
}

/// `"col"` or `table."col"` -> (table, col).
fn split_column(s: &str) -> (Option<&str>, &str) {
    match s.trim().split_once('.') {
        Some((table, col)) => (Some(table), unquote(col)),
        None => (None, unquote(s)),
    }
}

fn placeholder(token: &str, params: &[Value]) -> Option<Value> {
    let idx: usize = token.trim().trim_start_matches(['$', '?']).parse().ok()?;
    params.get(idx.checked_sub(1)?).cloned()
}

fn evaluate(
    tables: &HashMap<String, Vec<StoredRow>>,
    sql: &str,
    params: &[Value],
) -> Option<Vec<Row>> {
    let rest = sql.strip_prefix("SELECT ")?;
    let (columns, rest) = rest.split_once(" FROM ")?;
    let (rest, limit) = match rest.rsplit_once(" LIMIT ") {
        Some((r, n)) => (r, Some(n.trim().parse::<usize>().ok()?)),
        None => (rest, None),
    };
    let rest = rest.split_once(" ORDER BY ").map_or(rest, |(r, _)| r);
    let (from, condition) = match rest.split_once(" WHERE ") {
        Some((f, c)) => (f, Some(c)),
        None => (rest, None),
    };
    let names: Vec<&str> = from.split(", ").map(str::trim).collect();

    // Cartesian product of the FROM tables, keyed by "table.column".
    let mut combos: Vec<HashMap<String, Value>> = vec![HashMap::new()];
    for name in &names {
        let rows = tables.get(*name).cloned().unwrap_or_default();
        let mut next = Vec::new();
        for combo in &combos {
            for row in &rows {
                let mut merged = combo.clone();
                for (col, value) in row {
                    merged.insert(format!("{name}.{col}"), value.clone());
                }
                next.push(merged);
            }
        }
        combos = next;
    }

    let qualify = |table: Option<&str>, col: &str| format!("{}.{col}", table.unwrap_or(names[0]));

    if let Some(condition) = condition {
        for term in condition.split(" AND ") {
            if term.trim() == "1 = 0" {
                combos.clear();
            } else if let Some((lhs, rhs)) = term.split_once(" IN (") {
                let (table, col) = split_column(lhs);
                let key = qualify(table, col);
                let wanted: Vec<Value> = rhs
                    .trim_end_matches(')')
                    .split(", ")
                    .map(|p| placeholder(p, params))
                    .collect::<Option<_>>()?;
                combos.retain(|c| c.get(&key).is_some_and(|v| wanted.contains(v)));
            } else if let Some((lhs, rhs)) = term.split_once(" = ") {
                let (table, col) = split_column(lhs);
                let key = qualify(table, col);
                let wanted = placeholder(rhs, params)?;
                combos.retain(|c| c.get(&key) == Some(&wanted));
            } else {
                return None;
            }
        }
    }
    if let Some(n) = limit {
        combos.truncate(n);
    }

    let mut labels = Vec::new();
    let mut sources = Vec::new();
    for item in columns.split(", ") {
        let (source, label) = match item.split_once(" AS ") {
            Some((s, l)) => (s, unquote(l).to_string()),
            None => (item, unquote(item).to_string()),
        };
        let (table, col) = split_column(source);
        sources.push(qualify(table, col));
        labels.push(label);
    }

    Some(
        combos
            .into_iter()
            .map(|combo| {
                let values = sources
                    .iter()
                    .map(|s| combo.get(s).cloned().unwrap_or(Value::Null))
                    .collect();
                Row::new(labels.clone(), values)
            })
            .collect(),
    )
}

impl Connection for MockConnection {
    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl std::future::Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let result = self.select(sql, params);
        async move {
            match result {
                Ok(rows) => Outcome::Ok(rows),
                Err(e) => Outcome::Err(e),
            }
        }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        _params: &[Value],
    ) -> impl std::future::Future<Output = Outcome<u64, Error>> + Send {
        self.lock().statements.push(sql.to_string());
        async { Outcome::Ok(0) }
    }
}
