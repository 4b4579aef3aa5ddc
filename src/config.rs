//! Environment configuration and board column catalogs
//!
//! Column titles are the contract with the external record-management
//! system: every cleaned field maps back to exactly one declared column.

use std::env;

/// Runtime configuration, loaded once at startup
#[derive(Debug, Clone)]
pub struct Config {
    pub board_api_url: String,
    pub board_api_key: String,
    pub deals_board_id: String,
    pub workorders_board_id: String,
    pub llm_api_key: String,
    pub llm_base_url: String,
    pub llm_model: String,
    pub port: u16,
}

impl Config {
    /// Load from environment variables (call `dotenv::dotenv()` first in binaries)
    pub fn from_env() -> Self {
        Self {
            board_api_url: env::var("BOARD_API_URL")
                .unwrap_or_else(|_| "https://api.monday.com/v2".to_string()),
            board_api_key: env::var("BOARD_API_KEY").unwrap_or_default(),
            deals_board_id: env::var("DEALS_BOARD_ID").unwrap_or_default(),
            workorders_board_id: env::var("WORKORDERS_BOARD_ID").unwrap_or_default(),
            llm_api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            llm_base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            llm_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
            port: env::var("PORT")
                .or_else(|_| env::var("API_PORT"))
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8000),
        }
    }
}

/// Column titles on the Deals board
pub mod deal_cols {
    pub const OWNER: &str = "Owner code";
    pub const STATUS: &str = "Deal Status";
    pub const CLOSE_DATE: &str = "Close Date (A)";
    pub const PROBABILITY: &str = "Closure Probability";
    pub const VALUE: &str = "Masked Deal value";
    pub const TENTATIVE_CLOSE: &str = "Tentative Close Date";
    pub const STAGE: &str = "Deal Stage";
    pub const PRODUCT: &str = "Product deal";
    pub const SECTOR: &str = "Sector/service";
    pub const CREATED: &str = "Created Date";
}

/// Column titles on the Work Orders board
pub mod wo_cols {
    pub const DEAL_NAME: &str = "Deal name masked";
    pub const CUSTOMER: &str = "Customer Name Code";
    pub const SERIAL: &str = "Serial #";
    pub const NATURE: &str = "Nature of Work";
    pub const EXECUTION_STATUS: &str = "Execution Status";
    pub const SECTOR: &str = "Sector";
    pub const TYPE_OF_WORK: &str = "Type of Work";
    pub const OWNER: &str = "BD/KAM Personnel code";
    pub const QTY_PO: &str = "Quantities as per PO";
    pub const QTY_OPS: &str = "Quantity by Ops";
    pub const QTY_BALANCE: &str = "Balance in quantity";
    pub const AMOUNT_EXCL: &str = "Amount in Rupees (Excl of GST) (Masked)";
    pub const AMOUNT_INCL: &str = "Amount in Rupees (Incl of GST) (Masked)";
    pub const BILLED_EXCL: &str = "Billed Value in Rupees (Excl of GST.) (Masked)";
    pub const BILLED_INCL: &str = "Billed Value in Rupees (Incl of GST.) (Masked)";
    pub const COLLECTED: &str = "Collected Amount in Rupees (Incl of GST.) (Masked)";
    pub const TO_BILL_EXCL: &str = "Amount to be billed in Rupees (Excl of GST.) (Masked)";
    pub const TO_BILL_INCL: &str = "Amount to be billed in Rupees (Incl of GST.) (Masked)";
    pub const RECEIVABLE: &str = "Amount Receivable (Masked)";
    pub const WO_STATUS: &str = "WO Status (billed)";
    pub const BILLING_STATUS: &str = "Billing Status";
}

/// Valid filter vocabulary, surfaced in tool descriptions so the
/// reasoner sends values that actually occur in the data.
pub const DEAL_STATUSES: &[&str] = &["Won", "Dead", "Open", "On Hold"];

pub const DEAL_SECTORS: &[&str] = &[
    "Renewables", "Mining", "Railways", "Others", "Powerline",
    "Construction", "DSP", "Tender", "Manufacturing", "Aviation",
    "Security and Surveillance",
];

pub const EXECUTION_STATUSES: &[&str] = &[
    "Completed", "Ongoing", "Executed until current month",
    "Not Started", "Pause/struck", "Partial Completed", "Details pending",
];

pub const NATURE_OF_WORK: &[&str] = &[
    "One time Project", "POC", "Annual Rate Contract", "Monthly Contract",
];

pub const OWNER_CODES: &[&str] = &[
    "OWNER_001", "OWNER_002", "OWNER_003", "OWNER_004",
    "OWNER_005", "OWNER_006", "OWNER_007",
];
