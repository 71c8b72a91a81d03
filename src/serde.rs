use std::fmt;

use serde::de::{self, SeqAccess, Visitor};
use serde::Deserializer;

/// A Visitor implementation that is able to parse either a whitespace-separated
/// string or a sequence of strings into a list.
/// https://serde.rs/string-or-struct.html
pub fn string_or_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringOrList;

    impl<'de> Visitor<'de> for StringOrList {
        type Value = Option<Vec<String>>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("whitespace-separated string or list of strings")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value.split_whitespace().map(str::to_string).collect()))
        }

        fn visit_seq<S>(self, mut seq: S) -> Result<Self::Value, S::Error>
        where
            S: SeqAccess<'de>,
        {
            let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
            while let Some(item) = seq.next_element::<String>()? {
                items.push(item);
            }
            Ok(Some(items))
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_any(StringOrList)
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Lists {
        #[serde(default, deserialize_with = "super::string_or_list")]
        nodes: Option<Vec<String>>,
    }

    fn parse(yaml: &str) -> Option<Vec<String>> {
        serde_yaml::from_str::<Lists>(yaml).unwrap().nodes
    }

    #[test]
    fn test_string_is_split() {
        assert_eq!(parse("nodes: a  b c"), Some(vec!["a".into(), "b".into(), "c".into()]));
    }

    #[test]
    fn test_sequence_is_kept() {
        assert_eq!(parse("nodes: [a, b]"), Some(vec!["a".into(), "b".into()]));
        assert_eq!(parse("nodes:\n  - a\n  - b\n"), Some(vec!["a".into(), "b".into()]));
    }

    #[test]
    fn test_missing_and_null() {
        assert_eq!(parse("{}"), None);
        assert_eq!(parse("nodes: ~"), None);
    }

    #[test]
    fn test_number_is_rejected() {
        assert!(serde_yaml::from_str::<Lists>("nodes: 3").is_err());
    }
}
