fn main() {
    capty_lib::run()
}
