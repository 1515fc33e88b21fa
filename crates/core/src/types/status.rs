//! Free-text enumerants carried by inventory queue messages.
//!
//! Queue payloads are written by more than one producer, so these fields are
//! plain strings on the wire. Known values parse into a variant and anything
//! else is preserved verbatim in `Other`.

use serde::{Deserialize, Serialize};

macro_rules! open_enum {
    (
        $(#[$meta:meta])*
        $name:ident, default = $default:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
            /// A value not known to this service, kept as written.
            Other(String),
        }

        impl $name {
            /// Wire representation.
            #[must_use]
            pub fn as_str(&self) -> &str {
                match self {
                    $( Self::$variant => $text, )+
                    Self::Other(s) => s,
                }
            }

            /// Whether the value is one of the known variants.
            #[must_use]
            pub const fn is_known(&self) -> bool {
                !matches!(self, Self::Other(_))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::$default
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                match s.trim().to_ascii_lowercase().as_str() {
                    $( $text => Self::$variant, )+
                    _ => Self::Other(s),
                }
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::from(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                match value {
                    $name::Other(s) => s,
                    known => known.as_str().to_owned(),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

open_enum! {
    /// What happened to a product's stock.
    InventoryAction, default = Update {
        Add => "add",
        Remove => "remove",
        Update => "update",
        LowStockAlert => "low_stock_alert",
        OutOfStockAlert => "out_of_stock_alert",
        RestockRequest => "restock_request",
        InventoryAudit => "inventory_audit",
    }
}

open_enum! {
    /// Handling priority of a queue message.
    MessagePriority, default = Normal {
        Low => "low",
        Normal => "normal",
        High => "high",
        Urgent => "urgent",
    }
}

open_enum! {
    /// Processing status of a queue message.
    ///
    /// Advisory only: the queue has no way to update a message body in place,
    /// so this is whatever the producer wrote.
    MessageStatus, default = Pending {
        Pending => "pending",
        Processing => "processing",
        Completed => "completed",
        Failed => "failed",
    }
}
