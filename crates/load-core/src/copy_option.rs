//! COPY option vocabulary.
//!
//! Every option the Redshift `COPY` command accepts from this connector,
//! together with the shape its argument is rendered in. Declaration order is
//! the canonical render order: [`CopyOptionSet`] iterates in this order no
//! matter how options were inserted.

use crate::properties::{Properties, COPY_OPTIONS_PREFIX};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// How an option's argument is substituted into the command text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderShape {
    /// Keyword only, any argument is ignored.
    Flag,
    /// Argument wrapped in single quotes.
    Quoted,
    /// Argument substituted verbatim (numbers, ON/OFF).
    Raw,
    /// `CSV QUOTE '<char>'`.
    CsvQuote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[allow(clippy::upper_case_acronyms, non_camel_case_types)]
pub enum CopyOption {
    FIXEDWIDTH,
    DELIMITER,
    CSV,
    ENCRYPTED,
    GZIP,
    LZOP,
    REMOVEQUOTES,
    EXPLICIT_IDS,
    ACCEPTINVCHARS,
    MAXERROR,
    DATEFORMAT,
    TIMEFORMAT,
    IGNOREHEADER,
    ACCEPTANYDATE,
    IGNOREBLANKLINES,
    TRUNCATECOLUMNS,
    FILLRECORD,
    TRIMBLANKS,
    NOLOAD,
    NULL,
    EMPTYASNULL,
    BLANKSASNULL,
    COMPROWS,
    COMPUPDATE,
    STATUPDATE,
    ESCAPE,
    ROUNDEC,
}

impl CopyOption {
    /// All options in canonical order.
    pub const ALL: [CopyOption; 27] = [
        CopyOption::FIXEDWIDTH,
        CopyOption::DELIMITER,
        CopyOption::CSV,
        CopyOption::ENCRYPTED,
        CopyOption::GZIP,
        CopyOption::LZOP,
        CopyOption::REMOVEQUOTES,
        CopyOption::EXPLICIT_IDS,
        CopyOption::ACCEPTINVCHARS,
        CopyOption::MAXERROR,
        CopyOption::DATEFORMAT,
        CopyOption::TIMEFORMAT,
        CopyOption::IGNOREHEADER,
        CopyOption::ACCEPTANYDATE,
        CopyOption::IGNOREBLANKLINES,
        CopyOption::TRUNCATECOLUMNS,
        CopyOption::FILLRECORD,
        CopyOption::TRIMBLANKS,
        CopyOption::NOLOAD,
        CopyOption::NULL,
        CopyOption::EMPTYASNULL,
        CopyOption::BLANKSASNULL,
        CopyOption::COMPROWS,
        CopyOption::COMPUPDATE,
        CopyOption::STATUPDATE,
        CopyOption::ESCAPE,
        CopyOption::ROUNDEC,
    ];

    pub fn keyword(&self) -> &'static str {
        match self {
            CopyOption::FIXEDWIDTH => "FIXEDWIDTH",
            CopyOption::DELIMITER => "DELIMITER",
            CopyOption::CSV => "CSV",
            CopyOption::ENCRYPTED => "ENCRYPTED",
            CopyOption::GZIP => "GZIP",
            CopyOption::LZOP => "LZOP",
            CopyOption::REMOVEQUOTES => "REMOVEQUOTES",
            CopyOption::EXPLICIT_IDS => "EXPLICIT_IDS",
            CopyOption::ACCEPTINVCHARS => "ACCEPTINVCHARS",
            CopyOption::MAXERROR => "MAXERROR",
            CopyOption::DATEFORMAT => "DATEFORMAT",
            CopyOption::TIMEFORMAT => "TIMEFORMAT",
            CopyOption::IGNOREHEADER => "IGNOREHEADER",
            CopyOption::ACCEPTANYDATE => "ACCEPTANYDATE",
            CopyOption::IGNOREBLANKLINES => "IGNOREBLANKLINES",
            CopyOption::TRUNCATECOLUMNS => "TRUNCATECOLUMNS",
            CopyOption::FILLRECORD => "FILLRECORD",
            CopyOption::TRIMBLANKS => "TRIMBLANKS",
            CopyOption::NOLOAD => "NOLOAD",
            CopyOption::NULL => "NULL",
            CopyOption::EMPTYASNULL => "EMPTYASNULL",
            CopyOption::BLANKSASNULL => "BLANKSASNULL",
            CopyOption::COMPROWS => "COMPROWS",
            CopyOption::COMPUPDATE => "COMPUPDATE",
            CopyOption::STATUPDATE => "STATUPDATE",
            CopyOption::ESCAPE => "ESCAPE",
            CopyOption::ROUNDEC => "ROUNDEC",
        }
    }

    pub fn shape(&self) -> RenderShape {
        match self {
            CopyOption::FIXEDWIDTH
            | CopyOption::DELIMITER
            | CopyOption::ACCEPTINVCHARS
            | CopyOption::DATEFORMAT
            | CopyOption::TIMEFORMAT
            | CopyOption::NULL => RenderShape::Quoted,
            CopyOption::MAXERROR
            | CopyOption::IGNOREHEADER
            | CopyOption::COMPROWS
            | CopyOption::COMPUPDATE
            | CopyOption::STATUPDATE => RenderShape::Raw,
            CopyOption::CSV => RenderShape::CsvQuote,
            _ => RenderShape::Flag,
        }
    }

    /// The fragment emitted when no usable argument is present.
    pub fn bare_keyword(&self) -> String {
        match self {
            CopyOption::CSV => " CSV ".to_string(),
            _ => format!("{} ", self.keyword()),
        }
    }

    /// Render this option with an optional argument.
    ///
    /// Total: a missing argument, a flag option, or a raw argument that is not
    /// a plain token all fall back to [`CopyOption::bare_keyword`]. Quoted
    /// arguments have embedded single quotes doubled.
    pub fn arguments(&self, argument: Option<&str>) -> String {
        let Some(argument) = argument else {
            return self.bare_keyword();
        };

        match self.shape() {
            RenderShape::Flag => self.bare_keyword(),
            RenderShape::Quoted => format!("{} '{}' ", self.keyword(), quote_literal(argument)),
            RenderShape::CsvQuote => format!("CSV QUOTE '{}' ", quote_literal(argument)),
            RenderShape::Raw if is_plain_token(argument) => {
                format!("{} {} ", self.keyword(), argument.trim())
            }
            RenderShape::Raw => self.bare_keyword(),
        }
    }
}

impl fmt::Display for CopyOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl FromStr for CopyOption {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        CopyOption::ALL
            .iter()
            .copied()
            .find(|option| option.keyword().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("Unknown COPY option: {wanted}"))
    }
}

/// Double embedded single quotes for a SQL string literal.
pub fn quote_literal(value: &str) -> String {
    value.replace('\'', "''")
}

fn is_plain_token(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '+' | '-'))
}

/// Options selected for one COPY command, iterated in canonical order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyOptionSet {
    options: BTreeMap<CopyOption, Option<String>>,
}

impl CopyOptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan every known option for a `<prefix><OPTION>` key. Blank values
    /// count as "present without argument".
    pub fn extract(properties: &Properties, prefix: &str) -> Self {
        let mut set = Self::new();
        for option in CopyOption::ALL {
            let key = format!("{prefix}{}", option.keyword());
            if properties.contains_key(&key) {
                let value = properties.get_non_empty(&key).map(str::to_string);
                set.insert(option, value);
            }
        }
        set
    }

    /// [`CopyOptionSet::extract`] with the standard `copyoptions.` prefix.
    pub fn from_properties(properties: &Properties) -> Self {
        Self::extract(properties, COPY_OPTIONS_PREFIX)
    }

    pub fn with(mut self, option: CopyOption, argument: Option<&str>) -> Self {
        self.insert(option, argument.map(str::to_string));
        self
    }

    pub fn insert(&mut self, option: CopyOption, argument: Option<String>) {
        self.options.insert(option, argument);
    }

    pub fn contains(&self, option: CopyOption) -> bool {
        self.options.contains_key(&option)
    }

    pub fn get(&self, option: CopyOption) -> Option<Option<&str>> {
        self.options.get(&option).map(|v| v.as_deref())
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CopyOption, Option<&str>)> {
        self.options.iter().map(|(k, v)| (*k, v.as_deref()))
    }

    /// Concatenated fragments of every option, in canonical order.
    pub fn render(&self) -> String {
        self.iter()
            .map(|(option, argument)| option.arguments(argument))
            .collect()
    }

    /// Whether staged files must be gzip-compressed for this option set.
    pub fn expects_gzip(&self) -> bool {
        self.contains(CopyOption::GZIP)
    }
}
