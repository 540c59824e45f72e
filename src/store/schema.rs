//! SQLite schema for the mirrored tables.
//!
//! One table per upstream entity, plus `sync_status` bookkeeping. All
//! writes go through the sync engine; everything else only reads.

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS employees (
    id INTEGER PRIMARY KEY,
    firstname TEXT NOT NULL DEFAULT '',
    lastname TEXT NOT NULL DEFAULT '',
    function TEXT,
    active INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS contracts (
    id INTEGER PRIMARY KEY,
    employee_id INTEGER NOT NULL,
    hours_monday_even REAL NOT NULL DEFAULT 0,
    hours_tuesday_even REAL NOT NULL DEFAULT 0,
    hours_wednesday_even REAL NOT NULL DEFAULT 0,
    hours_thursday_even REAL NOT NULL DEFAULT 0,
    hours_friday_even REAL NOT NULL DEFAULT 0,
    hours_monday_odd REAL NOT NULL DEFAULT 0,
    hours_tuesday_odd REAL NOT NULL DEFAULT 0,
    hours_wednesday_odd REAL NOT NULL DEFAULT 0,
    hours_thursday_odd REAL NOT NULL DEFAULT 0,
    hours_friday_odd REAL NOT NULL DEFAULT 0,
    startdate TEXT NOT NULL,
    enddate TEXT
);

CREATE INDEX IF NOT EXISTS idx_contracts_employee ON contracts(employee_id);

CREATE TABLE IF NOT EXISTS hours (
    id INTEGER PRIMARY KEY,
    employee_id INTEGER NOT NULL,
    date TEXT NOT NULL,
    amount REAL NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_hours_employee_date ON hours(employee_id, date);

CREATE TABLE IF NOT EXISTS absence_requests (
    id INTEGER PRIMARY KEY,
    employee_id INTEGER NOT NULL,
    absencetype TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS absence_request_lines (
    id INTEGER PRIMARY KEY,
    absencerequest_id INTEGER NOT NULL,
    date TEXT NOT NULL,
    amount REAL NOT NULL DEFAULT 0,
    status_id INTEGER,
    status_name TEXT,
    FOREIGN KEY (absencerequest_id) REFERENCES absence_requests(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_absence_lines_request
    ON absence_request_lines(absencerequest_id);
CREATE INDEX IF NOT EXISTS idx_absence_lines_date
    ON absence_request_lines(date);

CREATE TABLE IF NOT EXISTS holidays (
    date TEXT PRIMARY KEY,
    name TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL DEFAULT '',
    active INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS invoices (
    id INTEGER PRIMARY KEY,
    number TEXT NOT NULL DEFAULT '',
    date TEXT,
    total REAL NOT NULL DEFAULT 0,
    paid INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS sync_status (
    entity TEXT PRIMARY KEY,
    last_sync TEXT,
    status TEXT NOT NULL DEFAULT 'never',
    error TEXT
);
"#;
