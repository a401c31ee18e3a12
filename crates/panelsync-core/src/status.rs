use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatus {
    pub online: u32,
    pub max: u32,
    pub name: String,
    pub map: String,
}

impl ServerStatus {
    pub fn occupancy(&self) -> (u32, u32) {
        (self.online, self.max)
    }

    /// Share of occupied slots; may exceed 1.0 when the server over-reports players.
    pub fn fill_ratio(&self) -> Option<f64> {
        if self.max == 0 {
            return None;
        }
        Some(self.online as f64 / self.max as f64)
    }
}
