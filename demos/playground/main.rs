use hypo::{AllocationPolicy, Allocator, Variant};

pub fn main() {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let visitor_id = args.next().unwrap_or_else(|| "user_12345".to_owned());
    let experiment_id = args.next().unwrap_or_else(|| "exp_abc99".to_owned());

    let variants = [
        Variant::new("v_control", true, 50),
        Variant::new("v_challenger", false, 50),
    ];

    for policy in [AllocationPolicy::BinaryThreshold, AllocationPolicy::Weighted] {
        let details = Allocator::new(policy)
            .allocate_with_details(&visitor_id, &experiment_id, &variants)
            .unwrap();

        // Same key and bucket under both policies; only the resolution rule differs.
        println!("{}", serde_json::to_string_pretty(&details).unwrap());
    }
}
