use anyhow::Result;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_with::skip_serializing_none;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    Black,
    DarkBlue,
    DarkGreen,
    DarkAqua,
    DarkRed,
    DarkPurple,
    Gold,
    Gray,
    DarkGray,
    Blue,
    Green,
    Aqua,
    Red,
    LightPurple,
    Yellow,
    White,
    #[serde(serialize_with = "color_serialize", deserialize_with = "color_deserialize")]
    #[serde(untagged)]
    Rgb(u8, u8, u8),
}

fn color_serialize<S>(red: &u8, green: &u8, blue: &u8, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer
{
    s.serialize_str(&format!("#{:02X}{:02X}{:02X}", red, green, blue))
}

fn color_deserialize<'de, D>(d: D) -> Result<(u8, u8, u8), D::Error>
where
    D: Deserializer<'de>
{
    let str = String::deserialize(d)?;
    let bytes = str.as_bytes();
    if str.len() != 7 || bytes[0] != b'#' {
        return Err(de::Error::custom("string is not a color"));
    }

    let hex = |range: std::ops::RangeInclusive<usize>| {
        u8::from_str_radix(&str[range], 16).map_err(de::Error::custom)
    };
    Ok((hex(1..=2)?, hex(3..=4)?, hex(5..=6)?))
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Content {
    Text(String),
    Keybind(String),
    #[serde(untagged)]
    Translation {
        translate: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        with: Option<Vec<Component>>,
    },
}

/// Json chat component, used for disconnect reasons, chat lines and the status motd.
#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub bold: Option<bool>,
    pub italic: Option<bool>,
    pub underlined: Option<bool>,
    pub color: Option<Color>,
    pub extra: Option<Vec<Component>>,
    #[serde(flatten)]
    pub content: Content,
}

impl Component {
    pub const fn content(content: Content) -> Self {
        Self {
            content,
            bold: None,
            italic: None,
            underlined: None,
            color: None,
            extra: None,
        }
    }

    pub fn text(text: &str) -> Self {
        Self::content(Content::Text(text.to_owned()))
    }

    pub fn colored(text: &str, color: Color) -> Self {
        let mut component = Self::text(text);
        component.color = Some(color);
        component
    }

    pub fn push(&mut self, component: Component) {
        self.extra.get_or_insert(Vec::new()).push(component)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| String::from(r#"{"text":""}"#))
    }

    /// Accepts both a component object and the bare json string form servers
    /// are allowed to send.
    pub fn parse(json: &str) -> Result<Self> {
        match serde_json::from_str::<serde_json::Value>(json)? {
            serde_json::Value::String(text) => Ok(Self::text(&text)),
            serde_json::Value::Array(parts) => {
                let mut parts = parts.into_iter().map(serde_json::from_value::<Component>);
                let mut root = match parts.next() {
                    Some(first) => first?,
                    None => Self::text(""),
                };
                for part in parts {
                    root.push(part?);
                }
                Ok(root)
            }
            value => Ok(serde_json::from_value(value)?),
        }
    }

    /// Text content without formatting, translation keys are kept as is.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        self.write_plain(&mut out);
        out
    }

    fn write_plain(&self, out: &mut String) {
        match &self.content {
            Content::Text(text) => out.push_str(text),
            Content::Keybind(key) => out.push_str(key),
            Content::Translation { translate, .. } => out.push_str(translate),
        }
        for child in self.extra.iter().flatten() {
            child.write_plain(out);
        }
    }
}
