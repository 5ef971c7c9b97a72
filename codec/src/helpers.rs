use log::trace;

pub fn log_data(name: &str, txt: &str, data: &[u8]) {
    if !data.is_empty() {
        trace!("{} {}: {:02X?}", name, txt, data);
    }
}
