//! Enumerated status and kind fields stored as text columns.

use serde::{Deserialize, Serialize};

macro_rules! text_enum {
    (listed $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        text_enum!($name { $($variant => $text),+ });

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];
        }
    };
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            pub fn parse(raw: &str) -> Option<Self> {
                match raw.trim().to_ascii_lowercase().as_str() {
                    $($text => Some($name::$variant),)+
                    _ => None,
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

text_enum!(listed Role {
    Admin => "admin",
    Owner => "owner",
    Tenant => "tenant",
});

text_enum!(AssetType {
    House => "house",
    Condo => "condo",
    Apartment => "apartment",
    Land => "land",
});

text_enum!(listed AssetStatus {
    Available => "available",
    Rented => "rented",
    Maintenance => "maintenance",
});

text_enum!(ContractStatus {
    Active => "active",
    Expired => "expired",
    Terminated => "terminated",
    Pending => "pending",
});

text_enum!(PaymentType {
    Rent => "rent",
    Deposit => "deposit",
    Utility => "utility",
    Other => "other",
});

text_enum!(listed PaymentStatus {
    Pending => "pending",
    WaitingApproval => "waiting_approval",
    Paid => "paid",
    Overdue => "overdue",
});

text_enum!(MaintenanceStatus {
    Pending => "pending",
    InProgress => "in_progress",
    Completed => "completed",
    Cancelled => "cancelled",
});

text_enum!(FinancialType {
    Income => "income",
    Expense => "expense",
});

text_enum!(NotificationStatus {
    Unread => "unread",
    Read => "read",
});
