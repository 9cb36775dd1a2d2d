#![allow(missing_docs)]

use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

macro_rules! num_id {
    ($id:ident, $t:ty) => {
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $id($t);

        impl $id {
            pub const fn new(v: $t) -> Self {
                $id(v)
            }
        }

        impl Deref for $id {
            type Target = $t;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl From<$t> for $id {
            fn from(v: $t) -> Self {
                $id(v)
            }
        }

        impl fmt::Display for $id {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

num_id!(CodecConfigId, u32);
num_id!(AudioElementId, u32);
num_id!(MixPresentationId, u32);
num_id!(ParameterId, u32);
num_id!(SubstreamId, u32);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn deref_and_display() {
        let id = ParameterId::from(42);
        assert_eq!(*id, 42);
        assert_eq!(id.to_string(), "42");
        assert!(SubstreamId::new(1) < SubstreamId::new(2));
    }
}
