//! Type registry: maps wire type names to payload decoders.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A message that can travel inside an envelope.
pub trait WireType: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Name written into the envelope and used for dispatch.
    const TYPE_NAME: &'static str;
}

type Body = Arc<dyn Any + Send + Sync>;
type DecodeFn = fn(&[u8]) -> Result<Body, bincode::Error>;

fn decode_body<T: WireType>(bytes: &[u8]) -> Result<Body, bincode::Error> {
    let message: T = bincode::deserialize(bytes)?;
    Ok(Arc::new(message))
}

/// A decoded payload tagged with its registered type name.
#[derive(Clone)]
pub struct TypedMessage {
    type_name: &'static str,
    body: Body,
}

impl TypedMessage {
    pub fn new<T: WireType>(message: T) -> Self {
        Self {
            type_name: T::TYPE_NAME,
            body: Arc::new(message),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// `None` if the body is not a `T`.
    pub fn downcast<T: WireType>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.body).downcast::<T>().ok()
    }
}

impl fmt::Debug for TypedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedMessage")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// Populated once at startup with every message type the node understands.
#[derive(Default)]
pub struct MessageRegistry {
    decoders: HashMap<&'static str, DecodeFn>,
}

impl MessageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the name was already registered.
    pub fn register<T: WireType>(&mut self) -> bool {
        self.decoders
            .insert(T::TYPE_NAME, decode_body::<T>)
            .is_none()
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.decoders.contains_key(type_name)
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// `None` for an unregistered name, `Some(Err)` for a malformed payload.
    pub fn decode(
        &self,
        type_name: &str,
        payload: &[u8],
    ) -> Option<Result<TypedMessage, bincode::Error>> {
        let (&name, decode) = self.decoders.get_key_value(type_name)?;
        Some(decode(payload).map(|body| TypedMessage {
            type_name: name,
            body,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Hello {
        greeting: String,
    }

    impl WireType for Hello {
        const TYPE_NAME: &'static str = "Hello";
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Other(u8);

    impl WireType for Other {
        const TYPE_NAME: &'static str = "Other";
    }

    #[test]
    fn decodes_registered_type() {
        let mut registry = MessageRegistry::new();
        assert!(registry.register::<Hello>());
        let bytes = bincode::serialize(&Hello { greeting: "hi".into() }).unwrap();
        let message = registry.decode("Hello", &bytes).unwrap().unwrap();
        assert_eq!(message.type_name(), "Hello");
        assert_eq!(message.downcast::<Hello>().unwrap().greeting, "hi");
        assert!(message.downcast::<Other>().is_none());
    }

    #[test]
    fn unknown_type_is_none() {
        let registry = MessageRegistry::new();
        assert!(registry.decode("Hello", &[]).is_none());
    }

    #[test]
    fn double_registration_reported() {
        let mut registry = MessageRegistry::new();
        assert!(registry.register::<Hello>());
        assert!(!registry.register::<Hello>());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn malformed_payload_is_error() {
        let mut registry = MessageRegistry::new();
        registry.register::<Hello>();
        assert!(registry.decode("Hello", &[0xFF]).unwrap().is_err());
    }
}
