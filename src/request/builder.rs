//! Call-order-validated construction of JSON response trees.
//!
//! Every call is checked against an explicit expectation state derived from
//! the context stack; misuse returns a structured error instead of producing
//! a malformed tree.

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuilderError {
    #[error("key() is only valid inside an object that is awaiting a key")]
    KeyNotExpected,
    #[error("a value is not expected here")]
    ValueNotExpected,
    #[error("end_object() without a matching start_object()")]
    MismatchedEndObject,
    #[error("end_array() without a matching start_array()")]
    MismatchedEndArray,
    #[error("build() called before the tree was finished")]
    Unfinished,
}

/// What the builder will accept next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    /// Nothing has been produced yet: any value may start the tree.
    Root,
    /// Inside an object, awaiting `key()` or `end_object()`.
    KeyOrEnd,
    /// Inside an object with a pending key, awaiting its value.
    ValueForKey,
    /// Inside an array, awaiting an item or `end_array()`.
    ItemOrEnd,
    /// The root value is complete; only `build()` is valid.
    Done,
}

#[derive(Debug)]
enum Frame {
    Object {
        map: Map<String, Value>,
        pending_key: Option<String>,
    },
    Array(Vec<Value>),
}

#[derive(Debug, Default)]
pub struct ValueBuilder {
    stack: Vec<Frame>,
    root: Option<Value>,
}

impl ValueBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn expect(&self) -> Expect {
        match self.stack.last() {
            Some(Frame::Object { pending_key, .. }) => {
                if pending_key.is_some() {
                    Expect::ValueForKey
                } else {
                    Expect::KeyOrEnd
                }
            }
            Some(Frame::Array(_)) => Expect::ItemOrEnd,
            None if self.root.is_none() => Expect::Root,
            None => Expect::Done,
        }
    }

    /// True in any state where a value (or container start) may appear.
    fn accepts_value(&self) -> bool {
        matches!(
            self.expect(),
            Expect::Root | Expect::ValueForKey | Expect::ItemOrEnd
        )
    }

    fn place(&mut self, value: Value) {
        match self.stack.last_mut() {
            Some(Frame::Object { map, pending_key }) => {
                let key = pending_key.take().expect("checked by accepts_value");
                map.insert(key, value);
            }
            Some(Frame::Array(items)) => items.push(value),
            None => self.root = Some(value),
        }
    }

    pub fn key(&mut self, key: impl Into<String>) -> Result<&mut Self, BuilderError> {
        match self.stack.last_mut() {
            Some(Frame::Object { pending_key, .. }) if pending_key.is_none() => {
                *pending_key = Some(key.into());
                Ok(self)
            }
            _ => Err(BuilderError::KeyNotExpected),
        }
    }

    pub fn value(&mut self, value: impl Into<Value>) -> Result<&mut Self, BuilderError> {
        if !self.accepts_value() {
            return Err(BuilderError::ValueNotExpected);
        }
        self.place(value.into());
        Ok(self)
    }

    pub fn start_object(&mut self) -> Result<&mut Self, BuilderError> {
        if !self.accepts_value() {
            return Err(BuilderError::ValueNotExpected);
        }
        self.stack.push(Frame::Object {
            map: Map::new(),
            pending_key: None,
        });
        Ok(self)
    }

    pub fn end_object(&mut self) -> Result<&mut Self, BuilderError> {
        match self.stack.last() {
            Some(Frame::Object { pending_key: None, .. }) => {
                let Some(Frame::Object { map, .. }) = self.stack.pop() else {
                    unreachable!()
                };
                self.place(Value::Object(map));
                Ok(self)
            }
            _ => Err(BuilderError::MismatchedEndObject),
        }
    }

    pub fn start_array(&mut self) -> Result<&mut Self, BuilderError> {
        if !self.accepts_value() {
            return Err(BuilderError::ValueNotExpected);
        }
        self.stack.push(Frame::Array(Vec::new()));
        Ok(self)
    }

    pub fn end_array(&mut self) -> Result<&mut Self, BuilderError> {
        match self.stack.last() {
            Some(Frame::Array(_)) => {
                let Some(Frame::Array(items)) = self.stack.pop() else {
                    unreachable!()
                };
                self.place(Value::Array(items));
                Ok(self)
            }
            _ => Err(BuilderError::MismatchedEndArray),
        }
    }

    pub fn build(self) -> Result<Value, BuilderError> {
        if !self.stack.is_empty() {
            return Err(BuilderError::Unfinished);
        }
        self.root.ok_or(BuilderError::Unfinished)
    }
}
