use rand::Rng;

/// Generates a 4-digit verification code, uniform over [1000, 9999].
pub fn generate_verification_code() -> String {
    let mut rng = rand::thread_rng();
    rng.gen_range(1000..=9999).to_string()
}
