mod node_record;

pub use node_record::NodeRecord;
