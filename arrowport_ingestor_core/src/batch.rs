use arrow::array::RecordBatch;

/// A record batch decoded from an Arrow IPC payload.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedBatch {
    batch: RecordBatch,
    encoded_len: usize,
}

impl DecodedBatch {
    pub fn new(batch: RecordBatch, encoded_len: usize) -> Self {
        Self { batch, encoded_len }
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    /// Size in bytes of the payload the batch was decoded from.
    pub fn encoded_len(&self) -> usize {
        self.encoded_len
    }

    pub fn into_inner(self) -> RecordBatch {
        self.batch
    }

    /// Split the batch into slices of at most `chunk_size` rows.
    ///
    /// Slicing is zero-copy. An empty batch yields a single empty slice so
    /// that the destination can still be created from its schema.
    pub fn chunks(&self, chunk_size: usize) -> impl Iterator<Item = RecordBatch> + '_ {
        let num_rows = self.batch.num_rows();
        let chunk_size = chunk_size.max(1);
        let num_chunks = num_rows.div_ceil(chunk_size).max(1);

        (0..num_chunks).map(move |index| {
            let offset = index * chunk_size;
            let len = chunk_size.min(num_rows - offset);
            self.batch.slice(offset, len)
        })
    }
}

impl From<RecordBatch> for DecodedBatch {
    fn from(batch: RecordBatch) -> Self {
        let encoded_len = batch.get_array_memory_size();
        Self::new(batch, encoded_len)
    }
}
