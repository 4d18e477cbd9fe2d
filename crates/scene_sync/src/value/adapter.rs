//! Wire-format adapters for values whose native form is not plain JSON.

use crate::types::WireValue;
use serde::{de::DeserializeOwned, Serialize};
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// Boxed native value held by an adapted slot.
pub type NativeBox = Box<dyn Any + Send + Sync>;

type EncodeFn = dyn Fn(&(dyn Any + Send + Sync)) -> Result<WireValue, String> + Send + Sync;
type DecodeFn = dyn Fn(&WireValue) -> Result<NativeBox, String> + Send + Sync;

/// A named pair of pure functions converting between a native type and its wire form.
///
/// Adapters are cheap to clone and are shared between every value of a field.
///
/// # Examples
///
/// ```rust
/// use scene_sync::value::Adapter;
/// use serde_json::json;
///
/// #[derive(Debug, Clone, PartialEq)]
/// enum Team { Red, Blue }
///
/// let team = Adapter::new::<Team, _, _>(
///     "team",
///     |team| Ok(json!(match team { Team::Red => "red", Team::Blue => "blue" })),
///     |wire| match wire.as_str() {
///         Some("red") => Ok(Team::Red),
///         Some("blue") => Ok(Team::Blue),
///         other => Err(format!("unknown team {other:?}")),
///     },
/// );
/// assert_eq!(team.name(), "team");
/// ```
#[derive(Clone)]
pub struct Adapter {
    name: &'static str,
    type_name: &'static str,
    type_id: TypeId,
    encode: Arc<EncodeFn>,
    decode: Arc<DecodeFn>,
}

impl Adapter {
    /// Builds an adapter from explicit conversion functions.
    pub fn new<T, E, D>(name: &'static str, encode: E, decode: D) -> Self
    where
        T: Any + Send + Sync,
        E: Fn(&T) -> Result<WireValue, String> + Send + Sync + 'static,
        D: Fn(&WireValue) -> Result<T, String> + Send + Sync + 'static,
    {
        let type_name = std::any::type_name::<T>();
        Self {
            name,
            type_name,
            type_id: TypeId::of::<T>(),
            encode: Arc::new(move |native: &(dyn Any + Send + Sync)| match native.downcast_ref::<T>() {
                Some(value) => encode(value),
                None => Err(format!("expected native {}", type_name)),
            }),
            decode: Arc::new(move |wire: &WireValue| decode(wire).map(|value| Box::new(value) as NativeBox)),
        }
    }

    /// Adapter for any native type with serde support (vectors, enums, structs).
    pub fn serde<T>(name: &'static str) -> Self
    where
        T: Serialize + DeserializeOwned + Any + Send + Sync,
    {
        Self::new::<T, _, _>(
            name,
            |value| serde_json::to_value(value).map_err(|e| e.to_string()),
            |wire| serde_json::from_value(wire.clone()).map_err(|e| e.to_string()),
        )
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Rust type name of the native side.
    pub fn native_type(&self) -> &'static str {
        self.type_name
    }

    pub fn accepts<T: Any>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    pub(crate) fn encode(&self, native: &(dyn Any + Send + Sync)) -> Result<WireValue, String> {
        (self.encode)(native)
    }

    pub(crate) fn decode(&self, wire: &WireValue) -> Result<NativeBox, String> {
        (self.decode)(wire)
    }
}

impl fmt::Debug for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Adapter")
            .field("name", &self.name)
            .field("native", &self.type_name)
            .finish()
    }
}
