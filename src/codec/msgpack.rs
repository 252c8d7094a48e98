//! MsgPack codec using `rmp-serde`.
//!
//! Bodies are always written with `to_vec_named` so structs travel as maps
//! keyed by field name. Positional (array) encoding would tie every peer to
//! our field order.
//!
//! # Example
//!
//! ```
//! use ua_dispatch::codec::MsgPackCodec;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct WriteValue {
//!     node_id: String,
//!     value: f64,
//! }
//!
//! let msg = WriteValue { node_id: "ns=2;s=Setpoint".to_string(), value: 21.5 };
//! let encoded = MsgPackCodec::encode(&msg).unwrap();
//! let decoded: WriteValue = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, msg);
//! ```

use crate::error::Result;

/// MessagePack codec for service bodies and envelope messages.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes.
    ///
    /// Uses `to_vec_named` for struct-as-map format.
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Decoding`](crate::error::DispatchError::Decoding)
    /// if the bytes cannot be deserialized to type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
