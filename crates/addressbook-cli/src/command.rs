//! Command grammar
//!
//! One command per line, whitespace separated, three-letter upper-case
//! command names:
//!
//! ```text
//! LIN <userID> <password>        LOU                 CHP <old password>
//! ADU <userID>                   DEU <userID>        DAL [<userID>]
//! ADR <recordID> [<field=value> ...]                 DER <recordID>
//! EDR <recordID> <field=value> [<field=value> ...]   RER [<recordID>] [<fieldname> ...]
//! IMD <input file>               EXD <output file>   HLP [<command name>]
//! ```

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use secrecy::SecretString;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Empty command")]
    Empty,

    #[error("Unrecognized command: '{0}'")]
    Unknown(String),

    #[error("{command} is missing <{argument}>")]
    MissingArgument {
        command: CommandName,
        argument: &'static str,
    },

    #[error("{command} does not take '{argument}'")]
    UnexpectedArgument { command: CommandName, argument: String },

    #[error("Expected <field=value>, got '{0}'")]
    MalformedField(String),

    #[error("Field '{0}' given more than once")]
    DuplicateField(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandName {
    Lin,
    Lou,
    Chp,
    Adu,
    Deu,
    Dal,
    Adr,
    Der,
    Edr,
    Rer,
    Imd,
    Exd,
    Hlp,
}

impl CommandName {
    pub const ALL: [CommandName; 13] = [
        CommandName::Lin,
        CommandName::Lou,
        CommandName::Chp,
        CommandName::Adu,
        CommandName::Deu,
        CommandName::Dal,
        CommandName::Adr,
        CommandName::Der,
        CommandName::Edr,
        CommandName::Rer,
        CommandName::Imd,
        CommandName::Exd,
        CommandName::Hlp,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CommandName::Lin => "LIN",
            CommandName::Lou => "LOU",
            CommandName::Chp => "CHP",
            CommandName::Adu => "ADU",
            CommandName::Deu => "DEU",
            CommandName::Dal => "DAL",
            CommandName::Adr => "ADR",
            CommandName::Der => "DER",
            CommandName::Edr => "EDR",
            CommandName::Rer => "RER",
            CommandName::Imd => "IMD",
            CommandName::Exd => "EXD",
            CommandName::Hlp => "HLP",
        }
    }

    pub fn syntax(self) -> &'static str {
        match self {
            CommandName::Lin => "LIN <userID> <password>",
            CommandName::Lou => "LOU",
            CommandName::Chp => "CHP <old password>",
            CommandName::Adu => "ADU <userID>",
            CommandName::Deu => "DEU <userID>",
            CommandName::Dal => "DAL [<userID>]",
            CommandName::Adr => "ADR <recordID> [<field1=value1> <field2=value2> ...]",
            CommandName::Der => "DER <recordID>",
            CommandName::Edr => "EDR <recordID> <field1=value1> [<field2=value2> ...]",
            CommandName::Rer => "RER [<recordID>] [<fieldname> ...]",
            CommandName::Imd => "IMD <Input_File>",
            CommandName::Exd => "EXD <Output_file>",
            CommandName::Hlp => "HLP [<command name>]",
        }
    }

    pub fn summary(self) -> &'static str {
        match self {
            CommandName::Lin => "Log in and unlock the user's address book",
            CommandName::Lou => "Log out",
            CommandName::Chp => "Change password",
            CommandName::Adu => "Add a user",
            CommandName::Deu => "Delete a user",
            CommandName::Dal => "Display the audit log",
            CommandName::Adr => "Add a record",
            CommandName::Der => "Delete a record",
            CommandName::Edr => "Edit fields of a record (empty value removes the field)",
            CommandName::Rer => "Read one record, optionally only some fields, or all records",
            CommandName::Imd => "Import records from a file",
            CommandName::Exd => "Export all records to a file",
            CommandName::Hlp => "Show help",
        }
    }
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandName {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CommandName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| CommandError::Unknown(s.to_string()))
    }
}

/// A parsed input line
#[derive(Debug)]
pub enum Command {
    Login {
        user_id: String,
        password: SecretString,
    },
    Logout,
    // User administration: arguments are checked, then discarded
    ChangePassword,
    AddUser,
    DeleteUser,
    DisplayAuditLog,
    AddRecord {
        record_id: String,
        fields: Vec<(String, String)>,
    },
    DeleteRecord {
        record_id: String,
    },
    EditRecord {
        record_id: String,
        fields: Vec<(String, String)>,
    },
    ReadRecord {
        record_id: Option<String>,
        field_names: Vec<String>,
    },
    Import {
        path: PathBuf,
    },
    Export {
        path: PathBuf,
    },
    Help {
        topic: Option<CommandName>,
    },
}

impl Command {
    pub fn name(&self) -> CommandName {
        match self {
            Command::Login { .. } => CommandName::Lin,
            Command::Logout => CommandName::Lou,
            Command::ChangePassword => CommandName::Chp,
            Command::AddUser => CommandName::Adu,
            Command::DeleteUser => CommandName::Deu,
            Command::DisplayAuditLog => CommandName::Dal,
            Command::AddRecord { .. } => CommandName::Adr,
            Command::DeleteRecord { .. } => CommandName::Der,
            Command::EditRecord { .. } => CommandName::Edr,
            Command::ReadRecord { .. } => CommandName::Rer,
            Command::Import { .. } => CommandName::Imd,
            Command::Export { .. } => CommandName::Exd,
            Command::Help { .. } => CommandName::Hlp,
        }
    }
}

/// Positional arguments of one command
struct Args<'a> {
    command: CommandName,
    tokens: std::str::SplitWhitespace<'a>,
}

impl<'a> Args<'a> {
    fn required(&mut self, argument: &'static str) -> Result<&'a str, CommandError> {
        self.tokens.next().ok_or(CommandError::MissingArgument {
            command: self.command,
            argument,
        })
    }

    fn optional(&mut self) -> Option<&'a str> {
        self.tokens.next()
    }

    fn rest(self) -> Vec<&'a str> {
        self.tokens.collect()
    }

    fn finish(mut self) -> Result<(), CommandError> {
        match self.tokens.next() {
            Some(extra) => Err(CommandError::UnexpectedArgument {
                command: self.command,
                argument: extra.to_string(),
            }),
            None => Ok(()),
        }
    }
}

fn parse_fields(tokens: Vec<&str>) -> Result<Vec<(String, String)>, CommandError> {
    let mut seen = HashSet::new();
    let mut fields = Vec::with_capacity(tokens.len());

    for token in tokens {
        let (name, value) = match token.split_once('=') {
            Some((name, value)) if !name.is_empty() => (name, value),
            _ => return Err(CommandError::MalformedField(token.to_string())),
        };
        if !seen.insert(name) {
            return Err(CommandError::DuplicateField(name.to_string()));
        }
        fields.push((name.to_string(), value.to_string()));
    }

    Ok(fields)
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut tokens = line.split_whitespace();
        let command: CommandName = tokens.next().ok_or(CommandError::Empty)?.parse()?;
        let mut args = Args { command, tokens };

        let parsed = match command {
            CommandName::Lin => {
                let user_id = args.required("userID")?.to_string();
                let password = SecretString::new(args.required("password")?.to_string());
                args.finish()?;
                Command::Login { user_id, password }
            }
            CommandName::Lou => {
                args.finish()?;
                Command::Logout
            }
            CommandName::Chp => {
                args.required("old password")?;
                args.finish()?;
                Command::ChangePassword
            }
            CommandName::Adu => {
                args.required("userID")?;
                args.finish()?;
                Command::AddUser
            }
            CommandName::Deu => {
                args.required("userID")?;
                args.finish()?;
                Command::DeleteUser
            }
            CommandName::Dal => {
                args.optional();
                args.finish()?;
                Command::DisplayAuditLog
            }
            CommandName::Adr => {
                let record_id = args.required("recordID")?.to_string();
                let fields = parse_fields(args.rest())?;
                Command::AddRecord { record_id, fields }
            }
            CommandName::Der => {
                let record_id = args.required("recordID")?.to_string();
                args.finish()?;
                Command::DeleteRecord { record_id }
            }
            CommandName::Edr => {
                let record_id = args.required("recordID")?.to_string();
                let fields = parse_fields(args.rest())?;
                if fields.is_empty() {
                    return Err(CommandError::MissingArgument {
                        command,
                        argument: "field=value",
                    });
                }
                Command::EditRecord { record_id, fields }
            }
            CommandName::Rer => {
                let record_id = args.optional().map(str::to_string);
                let field_names = args.rest().into_iter().map(str::to_string).collect();
                Command::ReadRecord {
                    record_id,
                    field_names,
                }
            }
            CommandName::Imd => {
                let path = PathBuf::from(args.required("Input_File")?);
                args.finish()?;
                Command::Import { path }
            }
            CommandName::Exd => {
                let path = PathBuf::from(args.required("Output_file")?);
                args.finish()?;
                Command::Export { path }
            }
            CommandName::Hlp => {
                let topic = args
                    .optional()
                    .map(str::parse::<CommandName>)
                    .transpose()?;
                args.finish()?;
                Command::Help { topic }
            }
        };

        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn parse(line: &str) -> Result<Command, CommandError> {
        line.parse()
    }

    #[test]
    fn test_login_keeps_password_secret() {
        match parse("LIN alice hunter2").unwrap() {
            Command::Login { user_id, password } => {
                assert_eq!(user_id, "alice");
                assert_eq!(password.expose_secret(), "hunter2");
            }
            other => panic!("unexpected command: {other:?}"),
        }
        let debug = format!("{:?}", parse("LIN alice hunter2").unwrap());
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_add_record_with_fields() {
        match parse("ADR r1 GN=Bob SN=Smith PEM=bob@example.com").unwrap() {
            Command::AddRecord { record_id, fields } => {
                assert_eq!(record_id, "r1");
                assert_eq!(
                    fields,
                    vec![
                        ("GN".to_string(), "Bob".to_string()),
                        ("SN".to_string(), "Smith".to_string()),
                        ("PEM".to_string(), "bob@example.com".to_string()),
                    ]
                );
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(matches!(
            parse("ADR r2").unwrap(),
            Command::AddRecord { fields, .. } if fields.is_empty()
        ));
    }

    #[test]
    fn test_edit_requires_a_field() {
        assert_eq!(
            parse("EDR r1").unwrap_err(),
            CommandError::MissingArgument {
                command: CommandName::Edr,
                argument: "field=value"
            }
        );
        match parse("EDR r1 GN=Rob SN=").unwrap() {
            Command::EditRecord { record_id, fields } => {
                assert_eq!(record_id, "r1");
                assert_eq!(fields.len(), 2);
                assert_eq!(fields[1], ("SN".to_string(), String::new()));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_read_record_forms() {
        assert!(matches!(
            parse("RER").unwrap(),
            Command::ReadRecord { record_id: None, field_names } if field_names.is_empty()
        ));
        match parse("RER r1 GN PPH").unwrap() {
            Command::ReadRecord {
                record_id,
                field_names,
            } => {
                assert_eq!(record_id.as_deref(), Some("r1"));
                assert_eq!(field_names, ["GN", "PPH"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_help_topics() {
        assert!(matches!(
            parse("HLP").unwrap(),
            Command::Help { topic: None }
        ));
        assert!(matches!(
            parse("HLP ADR").unwrap(),
            Command::Help {
                topic: Some(CommandName::Adr)
            }
        ));
        assert_eq!(
            parse("HLP XYZ").unwrap_err(),
            CommandError::Unknown("XYZ".to_string())
        );
    }

    #[test]
    fn test_grammar_errors() {
        assert_eq!(parse("   ").unwrap_err(), CommandError::Empty);
        assert_eq!(
            parse("adr r1").unwrap_err(),
            CommandError::Unknown("adr".to_string())
        );
        assert_eq!(
            parse("DER").unwrap_err(),
            CommandError::MissingArgument {
                command: CommandName::Der,
                argument: "recordID"
            }
        );
        assert_eq!(
            parse("LOU now").unwrap_err(),
            CommandError::UnexpectedArgument {
                command: CommandName::Lou,
                argument: "now".to_string()
            }
        );
        assert_eq!(
            parse("ADR r1 GN").unwrap_err(),
            CommandError::MalformedField("GN".to_string())
        );
        assert_eq!(
            parse("ADR r1 =Bob").unwrap_err(),
            CommandError::MalformedField("=Bob".to_string())
        );
        assert_eq!(
            parse("ADU").unwrap_err(),
            CommandError::MissingArgument {
                command: CommandName::Adu,
                argument: "userID"
            }
        );
    }

    #[test]
    fn test_repeated_field_names_are_rejected() {
        assert_eq!(
            parse("ADR r9 GN=a GN=b").unwrap_err(),
            CommandError::DuplicateField("GN".to_string())
        );
        assert_eq!(
            parse("EDR r9 SN= PPH=1 SN=Smith").unwrap_err(),
            CommandError::DuplicateField("SN".to_string())
        );
        assert!(parse("ADR r9 GN=a SN=a").is_ok());
    }

    #[test]
    fn test_every_name_round_trips() {
        for name in CommandName::ALL {
            assert_eq!(name.as_str().parse::<CommandName>().unwrap(), name);
            assert!(name.syntax().starts_with(name.as_str()));
        }
    }

    #[test]
    fn test_command_name_matches_parse() {
        assert_eq!(parse("IMD in.txt").unwrap().name(), CommandName::Imd);
        assert_eq!(parse("DAL").unwrap().name(), CommandName::Dal);
        assert_eq!(parse("CHP old").unwrap().name(), CommandName::Chp);
    }
}
