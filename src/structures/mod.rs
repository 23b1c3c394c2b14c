pub mod partition_mask;
