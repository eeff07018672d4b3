//! Representation of grid state at a certain point in time.

use chrono::{DateTime, Utc};
use fnv::FnvHashMap;

use crate::endpoint::{Endpoint, EndpointRef};
use crate::error::Error;
use crate::registry::Registry;
use crate::{Result, Tick};

/// Serialized state of one grid: its clock, endpoints and registry.
#[derive(Serialize, Deserialize)]
pub struct Snapshot {
    pub metadata: SnapshotMetadata,
    pub clock: Tick,
    pub endpoints: FnvHashMap<EndpointRef, Endpoint>,
    pub registry: Registry,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub created: DateTime<Utc>,
    /// Resource kind the snapshot was taken from; loading into a grid of a
    /// different kind is refused.
    pub kind: String,
}

impl Snapshot {
    pub fn new(
        kind: &str,
        clock: Tick,
        endpoints: FnvHashMap<EndpointRef, Endpoint>,
        registry: Registry,
    ) -> Snapshot {
        Snapshot {
            metadata: SnapshotMetadata {
                created: Utc::now(),
                kind: kind.to_string(),
            },
            clock,
            endpoints,
            registry,
        }
    }

    /// Serializes the snapshot to a vector of bytes.
    ///
    /// # Compression
    ///
    /// Optional compression using the LZ4 algorithm can be performed.
    pub fn to_bytes(&self, compress: bool) -> Result<Vec<u8>> {
        let mut data: Vec<u8> = bincode::serialize(&self)
            .map_err(|e| Error::FailedCreatingSnapshot(e.to_string()))?;
        #[cfg(feature = "lz4")]
        {
            if compress {
                data = lz4::block::compress(&data, None, true)?;
            }
        }
        #[cfg(not(feature = "lz4"))]
        let _ = compress;
        Ok(data)
    }

    /// Reads a snapshot back from bytes produced by [`Snapshot::to_bytes`].
    pub fn from_bytes(bytes: &[u8], compressed: bool) -> Result<Snapshot> {
        if compressed {
            #[cfg(feature = "lz4")]
            {
                let data = lz4::block::decompress(bytes, None)
                    .map_err(|e| Error::SnapshotDecompressionError(e.to_string()))?;
                return bincode::deserialize(&data)
                    .map_err(|e| Error::FailedReadingSnapshot(e.to_string()));
            }
            #[cfg(not(feature = "lz4"))]
            return Err(Error::FailedReadingSnapshot(
                "compressed snapshot but lz4 feature disabled".to_string(),
            ));
        }
        bincode::deserialize(bytes).map_err(|e| Error::FailedReadingSnapshot(e.to_string()))
    }
}
