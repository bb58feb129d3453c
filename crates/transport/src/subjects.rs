//! Subject and stream-name derivation (§4.6, §6): `<prefix>.pub.<address>`,
//! `<prefix>.send.<address>`, `<prefix>.req.<address>`.

/// Subject used for fanout `publish`. Every service instance subscribes
/// with its own queue group (named by `service`) so replicas of the same
/// service still see every publish, while two different services both get
/// their own copy.
pub fn publish_subject(prefix: &str, address: &str) -> String {
    format!("{prefix}.pub.{address}")
}

/// Subject used for point-to-point `send`. All subscribers share one queue
/// group named by `address`, so a message is delivered exactly once across
/// every replica of every service subscribed to it.
pub fn send_subject(prefix: &str, address: &str) -> String {
    format!("{prefix}.send.{address}")
}

/// Subject used for `request`. Queue group equals the subject itself, same
/// delivery-once semantics as `send`, with a synchronous reply.
pub fn request_subject(prefix: &str, address: &str) -> String {
    format!("{prefix}.req.{address}")
}

/// JetStream stream name backing durable `publish` traffic.
pub fn pub_stream_name(prefix: &str) -> String {
    format!("{}_PUB", prefix.to_uppercase())
}

/// JetStream stream name backing durable `send`/`request` traffic.
pub fn send_stream_name(prefix: &str) -> String {
    format!("{}_SEND", prefix.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_expected_subjects() {
        assert_eq!(publish_subject("verge", "job.created"), "verge.pub.job.created");
        assert_eq!(send_subject("verge", "job.created"), "verge.send.job.created");
        assert_eq!(request_subject("verge", "job.created"), "verge.req.job.created");
    }

    #[test]
    fn derives_upper_snake_stream_names() {
        assert_eq!(pub_stream_name("verge"), "VERGE_PUB");
        assert_eq!(send_stream_name("verge"), "VERGE_SEND");
    }
}
