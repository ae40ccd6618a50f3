// ABOUTME: Fixed application role table with derived permission sets
// ABOUTME: Parsing rejects any role outside the table
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Application-level account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full cross-database administration
    SuperAdmin,
    /// Application administrator
    Admin,
    /// Pipeline and schema maintenance
    DataEngineer,
    /// Read-only analytics
    EnergyAnalyst,
    /// Read-only dashboards
    Viewer,
    /// Sensor fleet maintenance
    SensorManager,
    /// Facility data maintenance
    FacilityManager,
    /// Read-only compliance access
    Auditor,
    /// Model training jobs
    MlModelTrainer,
    /// Machine-to-machine API access
    ApiClient,
}

impl Role {
    /// Every role in the table
    pub const ALL: [Self; 10] = [
        Self::SuperAdmin,
        Self::Admin,
        Self::DataEngineer,
        Self::EnergyAnalyst,
        Self::Viewer,
        Self::SensorManager,
        Self::FacilityManager,
        Self::Auditor,
        Self::MlModelTrainer,
        Self::ApiClient,
    ];

    /// Stored name of the role
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SuperAdmin => "superadmin",
            Self::Admin => "admin",
            Self::DataEngineer => "dataengineer",
            Self::EnergyAnalyst => "energyanalyst",
            Self::Viewer => "viewer",
            Self::SensorManager => "sensormanager",
            Self::FacilityManager => "facilitymanager",
            Self::Auditor => "auditor",
            Self::MlModelTrainer => "mlmodeltrainer",
            Self::ApiClient => "apiclient",
        }
    }

    /// Permission set granted by this role
    #[must_use]
    pub const fn permissions(self) -> &'static [&'static str] {
        match self {
            Self::SuperAdmin => &[
                "readWriteAnyDatabase",
                "userAdminAnyDatabase",
                "dbAdminAnyDatabase",
            ],
            Self::Admin => &["readWrite", "userAdmin"],
            Self::DataEngineer => &["readWrite", "dbAdmin"],
            Self::EnergyAnalyst | Self::Viewer | Self::Auditor => &["read"],
            Self::SensorManager | Self::FacilityManager | Self::ApiClient => &["readWrite"],
            Self::MlModelTrainer => &["read", "write"],
        }
    }

    /// Permission set as owned strings, ready to store
    #[must_use]
    pub fn permission_list(self) -> Vec<String> {
        self.permissions().iter().map(|p| (*p).to_owned()).collect()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| AppError::invalid_input(format!("Invalid role: {s}")))
    }
}
