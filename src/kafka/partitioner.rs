/// Maps a partition key onto one of `partition_count` partitions.
///
/// Implementations must be pure: the same inputs always give the same
/// partition, regardless of call order. `partition_count` is at least 1,
/// which configuration validation guarantees.
pub trait Partitioner: Send + Sync {
    fn select(&self, topic: &str, key: &[u8], partition_count: i32, previous_partition: i32) -> i32;
}

/// djb2 hash of the key modulo the partition count.
///
/// This is the hash partitioner shipped with the librdkafka examples, so
/// keys land on the same partitions as producers built on that callback.
#[derive(Debug, Default, Clone, Copy)]
pub struct HashPartitioner;

impl Partitioner for HashPartitioner {
    fn select(&self, _topic: &str, key: &[u8], partition_count: i32, _previous_partition: i32) -> i32 {
        (djb_hash(key) % partition_count as u32) as i32
    }
}

fn djb_hash(key: &[u8]) -> u32 {
    key.iter().fold(5381u32, |hash, &byte| {
        (hash << 5).wrapping_add(hash).wrapping_add(byte as u32)
    })
}
