pub use crate::definitions::*;
pub use crate::encoding::{
    EncodingError, EncodingResult, IntoEncodingResult, Serializable, serialize_to_vec,
};
pub use crate::parse::{Parsable, parse_complete, validate};
pub use crate::value_id::{ValueGenre, ValueId};
pub use crate::values::{Decimal, Value, ValueType};
