fn main() -> anyhow::Result<()> {
    gesture_pilot_lib::run()
}
