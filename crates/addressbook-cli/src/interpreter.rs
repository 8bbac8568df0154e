//! Command interpreter
//!
//! Owns the record store and the current login. Each input line is one
//! command; the interpreter answers with any output lines followed by
//! `OK`, or with a single `ERROR: <message>` line.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use addressbook_crypto::SecurityError;
use addressbook_store::{validate_user_id, ContactRecord, RecordError, RecordStore, StoreError};
use tracing::{debug, info, warn};

use crate::command::{Command, CommandError, CommandName};
use crate::session::{KeySource, Session};

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error("Input line is not valid UTF-8: {0}")]
    NotUtf8(#[source] std::str::Utf8Error),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("No active login")]
    NotLoggedIn,

    #[error("An account is already logged in: {0}")]
    AlreadyLoggedIn(String),

    #[error("{0} is not supported: user accounts are administered outside the address book")]
    Unsupported(CommandName),

    #[error("Cannot access {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

type DispatchResult = Result<Vec<String>, DispatchError>;

pub struct Interpreter {
    store: RecordStore,
    key_source: KeySource,
    session: Option<Session>,
}

impl Interpreter {
    pub fn new(store: RecordStore, key_source: KeySource) -> Self {
        Self {
            store,
            key_source,
            session: None,
        }
    }

    pub fn session_user(&self) -> Option<&str> {
        self.session.as_ref().map(Session::user_id)
    }

    /// Read commands until end of input, answering each on `output`
    ///
    /// A line that is not UTF-8 is answered with an error like any other
    /// bad command. Only I/O failures end the loop early.
    pub fn run<R, W>(&mut self, mut input: R, mut output: W, prompt: Option<&str>) -> io::Result<()>
    where
        R: BufRead,
        W: Write,
    {
        let mut buf = Vec::new();
        loop {
            if let Some(prompt) = prompt {
                write!(output, "{prompt}")?;
                output.flush()?;
            }
            buf.clear();
            if input.read_until(b'\n', &mut buf)? == 0 {
                break;
            }

            let result = match std::str::from_utf8(&buf) {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => self.execute_line(line),
                Err(e) => Err(DispatchError::NotUtf8(e)),
            };

            match result {
                Ok(reply) => {
                    for reply_line in reply {
                        writeln!(output, "{reply_line}")?;
                    }
                    writeln!(output, "OK")?;
                }
                Err(e) => {
                    debug!(error = %e, "command rejected");
                    writeln!(output, "ERROR: {e}")?;
                }
            }
            output.flush()?;
        }
        Ok(())
    }

    pub fn execute_line(&mut self, line: &str) -> DispatchResult {
        let command: Command = line.parse()?;
        self.execute(command)
    }

    pub fn execute(&mut self, command: Command) -> DispatchResult {
        match command {
            Command::Login { user_id, password } => {
                if let Some(session) = &self.session {
                    return Err(DispatchError::AlreadyLoggedIn(session.user_id().to_string()));
                }
                validate_user_id(&user_id)?;

                let session = Session::open(&user_id, &password, self.key_source)?;
                // loading the user's file checks the password
                match self.store.record_count(&user_id, session.cipher()) {
                    Ok(count) => {
                        info!(user = %user_id, records = count, "logged in");
                        self.session = Some(session);
                        Ok(Vec::new())
                    }
                    Err(StoreError::Security(SecurityError::DecryptionFailed)) => {
                        warn!(user = %user_id, "login rejected");
                        Err(DispatchError::InvalidCredentials)
                    }
                    Err(e) => Err(e.into()),
                }
            }

            Command::Logout => {
                let session = self.session.take().ok_or(DispatchError::NotLoggedIn)?;
                self.store.invalidate();
                info!(user = session.user_id(), "logged out");
                Ok(Vec::new())
            }

            Command::ChangePassword
            | Command::AddUser
            | Command::DeleteUser
            | Command::DisplayAuditLog => Err(DispatchError::Unsupported(command.name())),

            Command::AddRecord { record_id, fields } => {
                let session = self.session.as_ref().ok_or(DispatchError::NotLoggedIn)?;
                let cipher = session.cipher();
                if self.store.get(session.user_id(), &record_id, cipher)?.is_some() {
                    return Err(StoreError::DuplicateRecord(record_id).into());
                }

                let record = fields
                    .iter()
                    .try_fold(ContactRecord::new(&record_id)?, |record, (name, value)| {
                        record.with_field(name, value)
                    })?;
                self.store.set(session.user_id(), record, cipher, cipher)?;
                Ok(Vec::new())
            }

            Command::DeleteRecord { record_id } => {
                let session = self.session.as_ref().ok_or(DispatchError::NotLoggedIn)?;
                let cipher = session.cipher();
                self.store.delete(session.user_id(), &record_id, cipher, cipher)?;
                Ok(Vec::new())
            }

            Command::EditRecord { record_id, fields } => {
                let session = self.session.as_ref().ok_or(DispatchError::NotLoggedIn)?;
                let cipher = session.cipher();
                let existing = self
                    .store
                    .get(session.user_id(), &record_id, cipher)?
                    .ok_or(StoreError::NotFound(record_id))?;

                let edited = existing
                    .edited(fields.iter().map(|(name, value)| (name.as_str(), value.as_str())))?;
                self.store.set(session.user_id(), edited, cipher, cipher)?;
                Ok(Vec::new())
            }

            Command::ReadRecord {
                record_id,
                field_names,
            } => {
                let session = self.session.as_ref().ok_or(DispatchError::NotLoggedIn)?;
                let cipher = session.cipher();
                let records = match record_id {
                    Some(record_id) => vec![self
                        .store
                        .get(session.user_id(), &record_id, cipher)?
                        .ok_or(StoreError::NotFound(record_id))?],
                    None => self.store.list(session.user_id(), cipher)?,
                };

                let mut lines = Vec::with_capacity(records.len());
                for record in &records {
                    lines.push(project(record, &field_names)?.encode());
                }
                Ok(lines)
            }

            Command::Import { path } => {
                let session = self.session.as_ref().ok_or(DispatchError::NotLoggedIn)?;
                let cipher = session.cipher();
                let text = fs::read_to_string(&path)
                    .map_err(|source| DispatchError::File { path, source })?;
                let merged = self.store.import_all(session.user_id(), cipher, cipher, &text)?;
                Ok(vec![format!("Imported {merged} records")])
            }

            Command::Export { path } => {
                let session = self.session.as_ref().ok_or(DispatchError::NotLoggedIn)?;
                let text = self.store.export_all(session.user_id(), session.cipher())?;
                fs::write(&path, text).map_err(|source| DispatchError::File { path, source })?;
                Ok(Vec::new())
            }

            Command::Help { topic } => Ok(match topic {
                Some(name) => vec![name.syntax().to_string(), name.summary().to_string()],
                None => CommandName::ALL
                    .iter()
                    .map(|name| name.syntax().to_string())
                    .collect(),
            }),
        }
    }
}

/// The record restricted to the named fields; all fields when none are named
fn project(record: &ContactRecord, field_names: &[String]) -> Result<ContactRecord, RecordError> {
    if field_names.is_empty() {
        return Ok(record.clone());
    }

    field_names
        .iter()
        .filter_map(|name| record.field(name).map(|value| (name, value)))
        .try_fold(ContactRecord::new(record.id())?, |projected, (name, value)| {
            projected.with_field(name, value)
        })
}
