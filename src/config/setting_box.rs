//! Typed, self-describing setting cells
//!
//! Every entry of the [`SettingsStore`](super::SettingsStore) is a
//! [`SettingBox`]. The box fixes the *shape* of a setting when the store is
//! built; later updates arrive as raw JSON values and are coerced into that
//! shape by [`SettingBox::coerce`] or rejected.
//!
//! # Shapes
//!
//! - [`SettingBox::Choice`] - one selected entry out of an ordered list
//! - [`SettingBox::Path`] - a file or folder path (may not exist yet)
//! - [`SettingBox::Dimension`] - a `width x height` pair, optionally read-only
//! - [`SettingBox::Scalar`] - a plain bool, integer, float or string
//!
//! # Persisted representation
//!
//! | Shape | JSON |
//! |-------|------|
//! | Choice | `{"index": 1, "options": ["pdf", "png"]}` |
//! | Path | `"/home/lab/plots"` |
//! | Dimension | `[800, 600]` |
//! | Scalar | the literal value |

use serde_json::{json, Value};
use std::fmt;
use std::path::{Path, PathBuf};

/// A plain setting value
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// Name of the scalar kind, used in rejection messages
    pub fn kind(&self) -> &'static str {
        match self {
            Scalar::Bool(_) => "bool",
            Scalar::Int(_) => "int",
            Scalar::Float(_) => "float",
            Scalar::Text(_) => "string",
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Scalar::Bool(b) => json!(b),
            Scalar::Int(i) => json!(i),
            Scalar::Float(f) => json!(f),
            Scalar::Text(s) => json!(s),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::Text(s) => write!(f, "{}", s),
        }
    }
}

/// A configuration cell with a fixed shape
#[derive(Debug, Clone, PartialEq)]
pub enum SettingBox {
    /// Selected entry of an ordered option list. `index < options.len()` always holds.
    Choice {
        index: usize,
        options: Vec<String>,
        default_index: usize,
    },
    /// Filesystem path, file or folder
    Path {
        value: PathBuf,
        default: PathBuf,
        is_directory: bool,
    },
    /// Width/height pair; frozen unless `editable`
    Dimension {
        width: i64,
        height: i64,
        editable: bool,
    },
    /// Plain value
    Scalar(Scalar),
}

/// Why a raw value could not be coerced into a box
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection(pub String);

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl SettingBox {
    /// Create a choice box selecting `index`
    ///
    /// An out-of-range index falls back to the first option. Returns `None`
    /// when `options` is empty since the box could never satisfy its invariant.
    pub fn choice<S: Into<String>>(index: usize, options: impl IntoIterator<Item = S>) -> Option<Self> {
        let options: Vec<String> = options.into_iter().map(Into::into).collect();
        if options.is_empty() {
            return None;
        }
        let index = if index < options.len() { index } else { 0 };
        Some(SettingBox::Choice {
            index,
            options,
            default_index: index,
        })
    }

    /// Create a file path box
    pub fn file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        SettingBox::Path {
            value: path.clone(),
            default: path,
            is_directory: false,
        }
    }

    /// Create a folder path box
    pub fn folder(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        SettingBox::Path {
            value: path.clone(),
            default: path,
            is_directory: true,
        }
    }

    /// Create a dimension box
    pub fn dimension(width: i64, height: i64, editable: bool) -> Self {
        SettingBox::Dimension {
            width,
            height,
            editable,
        }
    }

    pub fn bool(value: bool) -> Self {
        SettingBox::Scalar(Scalar::Bool(value))
    }

    pub fn int(value: i64) -> Self {
        SettingBox::Scalar(Scalar::Int(value))
    }

    pub fn float(value: f64) -> Self {
        SettingBox::Scalar(Scalar::Float(value))
    }

    pub fn text(value: impl Into<String>) -> Self {
        SettingBox::Scalar(Scalar::Text(value.into()))
    }

    /// Short name of the shape
    pub fn kind(&self) -> &'static str {
        match self {
            SettingBox::Choice { .. } => "choice",
            SettingBox::Path { .. } => "path",
            SettingBox::Dimension { .. } => "dimension",
            SettingBox::Scalar(scalar) => scalar.kind(),
        }
    }

    /// Restore the construction-time value of choice and path boxes
    ///
    /// Returns true if the value changed. Dimensions and scalars have no
    /// stored default and are left alone.
    pub fn reset(&mut self) -> bool {
        match self {
            SettingBox::Choice {
                index,
                options,
                default_index,
            } => {
                let target = if *default_index < options.len() {
                    *default_index
                } else {
                    0
                };
                let changed = *index != target;
                *index = target;
                changed
            }
            SettingBox::Path { value, default, .. } => {
                let changed = value != default;
                *value = default.clone();
                changed
            }
            SettingBox::Dimension { .. } | SettingBox::Scalar(_) => false,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingBox::Scalar(Scalar::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            SettingBox::Scalar(Scalar::Int(i)) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value of a float or int scalar
    pub fn as_float(&self) -> Option<f64> {
        match self {
            SettingBox::Scalar(Scalar::Float(f)) => Some(*f),
            SettingBox::Scalar(Scalar::Int(i)) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SettingBox::Scalar(Scalar::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            SettingBox::Path { value, .. } => Some(value.as_path()),
            _ => None,
        }
    }

    pub fn as_dimension(&self) -> Option<(i64, i64)> {
        match self {
            SettingBox::Dimension { width, height, .. } => Some((*width, *height)),
            _ => None,
        }
    }

    /// Selected index and option list of a choice box
    pub fn as_choice(&self) -> Option<(usize, &[String])> {
        match self {
            SettingBox::Choice { index, options, .. } => Some((*index, options.as_slice())),
            _ => None,
        }
    }

    /// Label of the selected option of a choice box
    pub fn choice_label(&self) -> Option<&str> {
        self.as_choice()
            .and_then(|(index, options)| options.get(index))
            .map(String::as_str)
    }

    /// Persisted representation of this box
    pub fn to_json(&self) -> Value {
        match self {
            SettingBox::Choice { index, options, .. } => json!({
                "index": index,
                "options": options,
            }),
            SettingBox::Path { value, .. } => json!(value.to_string_lossy()),
            SettingBox::Dimension { width, height, .. } => json!([width, height]),
            SettingBox::Scalar(scalar) => scalar.to_json(),
        }
    }

    /// Coerce a raw value into this box's shape
    ///
    /// Returns the replacement box; `self` is never modified so a rejected
    /// value leaves the setting untouched.
    pub fn coerce(&self, raw: &Value) -> Result<SettingBox, Rejection> {
        match self {
            SettingBox::Choice {
                index,
                options,
                default_index,
            } => {
                let (new_index, new_options) = match raw {
                    Value::Number(_) => (Some(as_index(raw)?), None),
                    Value::Array(items) if is_choice_pair(items) => {
                        (Some(as_index(&items[0])?), Some(as_options(&items[1])?))
                    }
                    Value::Array(_) => (None, Some(as_options(raw)?)),
                    Value::Object(map) => {
                        let idx = map.get("index").map(as_index).transpose()?;
                        let opts = map.get("options").map(as_options).transpose()?;
                        if idx.is_none() && opts.is_none() {
                            return Err(Rejection(
                                "choice object needs \"index\" or \"options\"".to_string(),
                            ));
                        }
                        (idx, opts)
                    }
                    other => {
                        return Err(Rejection(format!(
                            "expected index or options for choice, got {}",
                            other
                        )))
                    }
                };

                let options = new_options.unwrap_or_else(|| options.clone());
                let index = match new_index {
                    Some(i) if i < options.len() => i,
                    Some(i) => {
                        return Err(Rejection(format!(
                            "choice index {} out of range (0..{})",
                            i,
                            options.len()
                        )))
                    }
                    // New option list without an index: keep the selection if it still fits
                    None if *index < options.len() => *index,
                    None => 0,
                };

                Ok(SettingBox::Choice {
                    index,
                    options,
                    default_index: *default_index,
                })
            }
            SettingBox::Path {
                default,
                is_directory,
                ..
            } => match raw {
                Value::String(s) => Ok(SettingBox::Path {
                    value: PathBuf::from(s),
                    default: default.clone(),
                    is_directory: *is_directory,
                }),
                other => Err(Rejection(format!("expected path string, got {}", other))),
            },
            SettingBox::Dimension {
                width,
                height,
                editable,
            } => {
                let (w, h) = as_pair(raw)?;
                if !*editable && (w, h) != (*width, *height) {
                    return Err(Rejection("dimension is not editable".to_string()));
                }
                Ok(SettingBox::Dimension {
                    width: w,
                    height: h,
                    editable: *editable,
                })
            }
            SettingBox::Scalar(current) => {
                let coerced = match (current, raw) {
                    (Scalar::Bool(_), Value::Bool(b)) => Scalar::Bool(*b),
                    (Scalar::Int(_), Value::Number(n)) if n.is_i64() || n.is_u64() => n
                        .as_i64()
                        .map(Scalar::Int)
                        .ok_or_else(|| Rejection(format!("integer {} out of range", n)))?,
                    (Scalar::Float(_), Value::Number(n)) => n
                        .as_f64()
                        .map(Scalar::Float)
                        .ok_or_else(|| Rejection(format!("number {} not representable", n)))?,
                    (Scalar::Text(_), Value::String(s)) => Scalar::Text(s.clone()),
                    (current, other) => {
                        return Err(Rejection(format!(
                            "expected {}, got {}",
                            current.kind(),
                            other
                        )))
                    }
                };
                Ok(SettingBox::Scalar(coerced))
            }
        }
    }
}

impl fmt::Display for SettingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingBox::Choice { index, options, .. } => {
                write!(f, "{}", options.get(*index).map(String::as_str).unwrap_or(""))
            }
            SettingBox::Path { value, .. } => write!(f, "{}", value.display()),
            SettingBox::Dimension { width, height, .. } => write!(f, "{} x {}", width, height),
            SettingBox::Scalar(scalar) => write!(f, "{}", scalar),
        }
    }
}

fn is_choice_pair(items: &[Value]) -> bool {
    items.len() == 2 && items[0].is_number() && items[1].is_array()
}

fn as_index(raw: &Value) -> Result<usize, Rejection> {
    raw.as_u64()
        .and_then(|i| usize::try_from(i).ok())
        .ok_or_else(|| Rejection(format!("expected non-negative index, got {}", raw)))
}

fn as_options(raw: &Value) -> Result<Vec<String>, Rejection> {
    let items = raw
        .as_array()
        .ok_or_else(|| Rejection(format!("expected option list, got {}", raw)))?;
    if items.is_empty() {
        return Err(Rejection("option list is empty".to_string()));
    }
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| Rejection(format!("option {} is not a string", item)))
        })
        .collect()
}

fn as_pair(raw: &Value) -> Result<(i64, i64), Rejection> {
    let items = raw
        .as_array()
        .filter(|items| items.len() == 2)
        .ok_or_else(|| Rejection(format!("expected [width, height], got {}", raw)))?;
    let component = |v: &Value| -> Result<i64, Rejection> {
        let parsed = match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        parsed.ok_or_else(|| Rejection(format!("dimension component {} is not an integer", v)))
    };
    Ok((component(&items[0])?, component(&items[1])?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn save_types() -> SettingBox {
        SettingBox::choice(0, ["pdf", "png"]).unwrap()
    }

    #[test]
    fn test_choice_constructor() {
        assert!(SettingBox::choice(0, Vec::<String>::new()).is_none());
        let clamped = SettingBox::choice(5, ["a", "b"]).unwrap();
        assert_eq!(clamped.to_string(), "a");
    }

    #[test]
    fn test_choice_index_update() {
        let updated = save_types().coerce(&json!(1)).unwrap();
        assert_eq!(updated.to_string(), "png");
    }

    #[test]
    fn test_choice_out_of_range_rejected() {
        assert!(save_types().coerce(&json!(2)).is_err());
        assert!(save_types().coerce(&json!(-1)).is_err());
        assert!(save_types().coerce(&json!([7, ["x", "y"]])).is_err());
    }

    #[test]
    fn test_choice_options_update_keeps_index() {
        let b = SettingBox::choice(1, ["a", "b"]).unwrap();
        let updated = b.coerce(&json!(["x", "y", "z"])).unwrap();
        assert_eq!(updated.to_string(), "y");

        let shrunk = b.coerce(&json!(["only"])).unwrap();
        assert_eq!(shrunk.to_string(), "only");
    }

    #[test]
    fn test_choice_pair_and_object() {
        let pair = save_types().coerce(&json!([2, ["a", "b", "c"]])).unwrap();
        assert_eq!(pair.to_string(), "c");

        let obj = save_types()
            .coerce(&json!({"index": 1, "options": ["wav", "ogg"]}))
            .unwrap();
        assert_eq!(obj.to_string(), "ogg");
        assert_eq!(obj.coerce(&obj.to_json()).unwrap(), obj);
    }

    #[test]
    fn test_choice_rejects_empty_options() {
        assert!(save_types().coerce(&json!([])).is_err());
        assert!(save_types().coerce(&json!("png")).is_err());
    }

    #[test]
    fn test_path_update() {
        let b = SettingBox::folder("/tmp/plots");
        let updated = b.coerce(&json!("/data/plots")).unwrap();
        assert_eq!(updated.to_string(), "/data/plots");
        match updated {
            SettingBox::Path { is_directory, .. } => assert!(is_directory),
            _ => panic!("shape changed"),
        }
        assert!(b.coerce(&json!(3)).is_err());
    }

    #[test]
    fn test_reset() {
        let mut b = SettingBox::file("/a.log").coerce(&json!("/b.log")).unwrap();
        assert!(b.reset());
        assert_eq!(b.to_string(), "/a.log");
        assert!(!b.reset());

        let mut c = save_types().coerce(&json!(1)).unwrap();
        assert!(c.reset());
        assert_eq!(c.to_string(), "pdf");
    }

    #[test]
    fn test_dimension_editable() {
        let b = SettingBox::dimension(800, 600, true);
        let updated = b.coerce(&json!([1024, "768"])).unwrap();
        assert_eq!(updated.to_string(), "1024 x 768");
        assert!(b.coerce(&json!([1, 2, 3])).is_err());
        assert!(b.coerce(&json!(["wide", 2])).is_err());
    }

    #[test]
    fn test_dimension_frozen() {
        let b = SettingBox::dimension(640, 720, false);
        assert!(b.coerce(&json!([1, 1])).is_err());
        // Writing back the same pair is not a change
        assert_eq!(b.coerce(&json!([640, 720])).unwrap(), b);
    }

    #[test]
    fn test_scalar_kinds() {
        assert_eq!(
            SettingBox::int(1).coerce(&json!(9600)).unwrap(),
            SettingBox::int(9600)
        );
        assert!(SettingBox::int(1).coerce(&json!(1.5)).is_err());
        assert!(SettingBox::int(1).coerce(&json!("1")).is_err());
        assert_eq!(
            SettingBox::float(1.0).coerce(&json!(2)).unwrap(),
            SettingBox::float(2.0)
        );
        assert!(SettingBox::bool(false).coerce(&json!(1)).is_err());
        assert_eq!(
            SettingBox::text("a").coerce(&json!("b")).unwrap(),
            SettingBox::text("b")
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(SettingBox::bool(true).to_string(), "true");
        assert_eq!(SettingBox::text("SND:HEX:").to_string(), "SND:HEX:");
    }
}
