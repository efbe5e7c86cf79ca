use bytes::BytesMut;
use tokio_postgres::types::{to_sql_checked, Format, IsNull, ToSql, Type};

/// One column value relayed verbatim from a remote fetch to a repository
/// insert.
///
/// The snapshot engine never interprets column semantics: rows are fetched
/// over the simple-query protocol, which yields every column as its text
/// representation, and re-bound positionally into the insert template. A
/// `TextValue` therefore encodes itself as a *text-format* parameter and
/// accepts whatever type the prepared statement inferred for its position,
/// leaving the actual parsing to the repository server. NULLs survive the
/// round trip as NULLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextValue(Option<String>);

impl TextValue {
    pub fn new(value: Option<&str>) -> Self {
        Self(value.map(str::to_owned))
    }

    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }
}

impl ToSql for TextValue {
    fn to_sql(
        &self,
        _ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match &self.0 {
            Some(text) => {
                out.extend_from_slice(text.as_bytes());
                Ok(IsNull::No)
            }
            None => Ok(IsNull::Yes),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    fn encode_format(&self, _ty: &Type) -> Format {
        Format::Text
    }

    to_sql_checked!();
}
