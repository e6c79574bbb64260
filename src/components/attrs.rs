use std::{collections::BTreeMap, fmt::Display};

/// Free-form metadata, never interpreted by the operations.
pub type Attrs = BTreeMap<String, AttrValue>;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<AttrValue>),
}

impl Display for AttrValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttrValue::Int(value) => write!(f, "{value}"),
            AttrValue::Float(value) => write!(f, "{value}"),
            AttrValue::Text(value) => write!(f, "{value}"),
            AttrValue::List(values) => {
                write!(f, "[")?;
                for (idx, value) in values.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Text(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Text(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Float(value)
    }
}

impl<V: Into<AttrValue>> From<Vec<V>> for AttrValue {
    fn from(value: Vec<V>) -> Self {
        AttrValue::List(value.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn attrs_serialize_untagged() {
        let mut attrs = Attrs::new();
        attrs.insert("crs".into(), "EPSG:32632".into());
        attrs.insert("resolution".into(), vec![-10.0, 10.0].into());
        let json = serde_json::to_string(&attrs).unwrap();
        assert_eq!(json, r#"{"crs":"EPSG:32632","resolution":[-10.0,10.0]}"#);
        let back: Attrs = serde_json::from_str(&json).unwrap();
        assert_eq!(back["resolution"].to_string(), "[-10, 10]");
    }
}
